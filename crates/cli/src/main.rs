use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use av1_rtp::media::av1::obu::{self, TEMPORAL_DELIMITER};
use av1_rtp::media::{Frame, Packetizer};
use av1_rtp::registry::BoxedDepacketizer;
use av1_rtp::transport::{FramedReader, write_framed};
use av1_rtp::{Av1Depacketizer, Av1Packetizer, DepacketizerConfig, StreamRegistry};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "av1-rtp",
    about = "Reassemble AV1 temporal units from RTP captures, or packetize them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Depacketize an RFC 4571 framed RTP capture into one .obu file per SSRC
    Depay(DepayArgs),
    /// Packetize a low-overhead .obu file into an RFC 4571 framed RTP capture
    Pack(PackArgs),
}

#[derive(Args)]
struct DepayArgs {
    /// Framed RTP capture (2-byte big-endian length before every packet)
    #[arg(long, short)]
    input: PathBuf,

    /// Directory receiving `<ssrc>.obu` files
    #[arg(long, short, default_value = ".")]
    out_dir: PathBuf,

    /// Keep temporal units that lost packets instead of dropping them
    #[arg(long)]
    allow_corrupt: bool,

    /// Largest temporal unit in bytes
    #[arg(long, default_value_t = av1_rtp::media::av1::depacketizer::DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,
}

#[derive(Args)]
struct PackArgs {
    /// Low-overhead OBU stream, temporal units separated by temporal delimiters
    #[arg(long, short)]
    input: PathBuf,

    /// Framed RTP capture to write
    #[arg(long, short)]
    output: PathBuf,

    /// Frame rate used to advance the 90 kHz RTP timestamp
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Largest RTP payload per packet
    #[arg(long, default_value_t = 1400)]
    mtu: usize,

    /// RTP payload type
    #[arg(long, default_value_t = 96)]
    pt: u8,

    /// RTP SSRC; random when omitted
    #[arg(long)]
    ssrc: Option<u32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Depay(args) => depay(args),
        Command::Pack(args) => pack(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Per-SSRC depacketizer writing each temporal unit, prefixed with a
/// temporal delimiter, to `<out_dir>/<ssrc>.obu`.
fn file_depacketizer(
    out_dir: &Path,
    ssrc: u32,
    config: DepacketizerConfig,
) -> BoxedDepacketizer {
    let path = out_dir.join(format!("{ssrc:08x}.obu"));
    let mut writer = match File::create(&path) {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "cannot create output, frames will be discarded"
            );
            None
        }
    };

    Box::new(Av1Depacketizer::with_config(
        move |frame: Frame<'_>| {
            let Some(out) = writer.as_mut() else {
                return;
            };
            if frame.is_corrupt() {
                tracing::warn!(
                    ts = frame.timestamp,
                    len = frame.data.len(),
                    "writing corrupt temporal unit"
                );
            }
            let written = out
                .write_all(&TEMPORAL_DELIMITER)
                .and_then(|()| out.write_all(frame.data));
            if let Err(e) = written {
                tracing::error!(path = %path.display(), error = %e, "write failed, closing output");
                writer = None;
            }
        },
        config,
    ))
}

fn depay(args: DepayArgs) -> av1_rtp::Result<()> {
    std::fs::create_dir_all(&args.out_dir)?;
    let reader = FramedReader::new(BufReader::new(File::open(&args.input)?));

    let config = DepacketizerConfig {
        max_frame_size: args.max_frame_size,
        allow_corrupt: args.allow_corrupt,
        ..Default::default()
    };
    let out_dir = args.out_dir.clone();
    let registry =
        StreamRegistry::new(move |ssrc| file_depacketizer(&out_dir, ssrc, config.clone()));

    let mut packets = 0u64;
    for (index, packet) in reader.enumerate() {
        let packet = packet?;
        packets += 1;
        // A bad packet only costs its own content.
        if let Err(e) = registry.input(&packet) {
            tracing::warn!(packet = index, error = %e, "packet rejected");
        }
    }
    let flushed = registry.flush_all();
    tracing::info!(packets, flushed, streams = registry.len(), "capture processed");

    for ssrc in registry.ssrcs() {
        if let Some(stats) = registry.stats(ssrc) {
            println!(
                "{ssrc:08x}: {} packets, {} lost, {} rejected, {} frames ({} corrupt, {} dropped)",
                stats.packets,
                stats.packets_lost,
                stats.rejected_packets,
                stats.frames_emitted,
                stats.corrupt_frames,
                stats.frames_dropped,
            );
        }
    }
    Ok(())
}

fn pack(args: PackArgs) -> av1_rtp::Result<()> {
    let data = std::fs::read(&args.input)?;
    let units = obu::split_temporal_units(&data)?;

    let mut packetizer = match args.ssrc {
        Some(ssrc) => Av1Packetizer::new(args.pt, ssrc),
        None => Av1Packetizer::with_random_ssrc(args.pt),
    }
    .with_mtu(args.mtu);
    let increment = packetizer.clock_rate() / args.fps.max(1);

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut packets = 0usize;
    for unit in &units {
        for packet in packetizer.packetize(unit, increment)? {
            write_framed(&mut out, &packet)?;
            packets += 1;
        }
    }
    out.flush()?;

    println!(
        "{} temporal units -> {} RTP packets ({})",
        units.len(),
        packets,
        packetizer.sdp_attributes().join(", ")
    );
    Ok(())
}
