//! RTP payload formats.
//!
//! This module provides the [`Depacketizer`] and [`Packetizer`] traits and
//! the codec-specific implementations behind them.
//!
//! ## RTP overview (RFC 3550)
//!
//! An encoded temporal unit travels as one or more RTP packets. The fields
//! that matter for reassembly are:
//!
//! - **Sequence number** (16-bit, wrapping): gaps reveal packet loss.
//! - **Timestamp** (32-bit): identical for every packet of a temporal unit;
//!   a change marks a frame boundary.
//! - **Marker bit**: set on the last packet of a temporal unit.
//!
//! ## Supported codecs
//!
//! | Codec | Module | Specification |
//! |-------|--------|---------------|
//! | AV1   | [`av1`] | [AV1 RTP payload](https://aomediacodec.github.io/av1-rtp-spec/) |

pub mod av1;
pub mod rtp;

use crate::error::Result;

/// Codec-specific RTP depacketizer.
///
/// One instance reassembles one RTP stream (one SSRC). Completed frames are
/// handed to the sink the implementation was constructed with, synchronously
/// from within [`input`](Self::input). Dropping the depacketizer releases
/// all of its storage.
pub trait Depacketizer {
    /// Feed one raw RTP packet (fixed header included).
    ///
    /// Per-packet failures leave the depacketizer usable; the caller decides
    /// whether repeated errors warrant recreating the stream.
    fn input(&mut self, packet: &[u8]) -> Result<InputOutcome>;

    /// Emit the frame being assembled, if it has content. Returns the number
    /// of frames delivered (0 or 1). Useful at end of stream, where no
    /// further timestamp change will complete a frame lacking its marker.
    fn flush(&mut self) -> usize;

    /// Running counters since construction.
    fn stats(&self) -> DepacketizerStats;

    /// Codec name as used in SDP `a=rtpmap` (e.g. `"AV1"`).
    fn codec_name(&self) -> &'static str;
}

/// Codec-specific RTP packetizer.
///
/// Each returned `Vec<u8>` is a complete RTP packet: 12-byte header
/// (RFC 3550 §5.1) followed by the codec payload.
pub trait Packetizer: Send {
    /// Packetize one encoded temporal unit.
    ///
    /// `timestamp_increment` advances the RTP timestamp after this unit,
    /// typically `clock_rate / fps` (e.g. 3000 for 30 fps at 90 kHz).
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32)
    -> Result<Vec<Vec<u8>>>;

    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz; 90 kHz for video (RFC 3551 §4).
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (dynamic range 96–127).
    fn payload_type(&self) -> u8;

    /// SDP media-level attribute lines, `a=` prefix included.
    fn sdp_attributes(&self) -> Vec<String>;

    /// Sequence number of the next packet.
    fn next_sequence(&self) -> u16;

    /// RTP timestamp of the next temporal unit.
    fn next_rtp_timestamp(&self) -> u32;
}

/// A completed temporal unit handed to the depacketizer's sink.
///
/// `data` is a low-overhead OBU stream: every OBU carries an explicit size
/// field. It borrows the depacketizer's buffer and is only valid for the
/// duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub data: &'a [u8],
    pub timestamp: u32,
    pub flags: FrameFlags,
}

impl Frame<'_> {
    pub fn is_corrupt(&self) -> bool {
        self.flags.contains(FrameFlags::PACKET_CORRUPT)
    }
}

bitflags::bitflags! {
    /// Per-frame status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u32 {
        /// Packets were lost since the previous delivered frame. Transient:
        /// cleared once a frame carrying it has been delivered.
        const PACKET_LOST = 0x0100;
        /// Packets belonging to this frame were lost; the content is
        /// incomplete.
        const PACKET_CORRUPT = 0x0200;
    }
}

/// Result of a successfully handled packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputOutcome {
    /// Frames delivered to the sink while handling this packet (0–2).
    pub frames_emitted: usize,
    /// The payload header broke a packetization rule but was still processed.
    pub header_violation: bool,
}

/// Running depacketizer counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepacketizerStats {
    /// Packets that parsed as RTP and carried a payload.
    pub packets: u64,
    /// Packets missing according to sequence-number gaps.
    pub packets_lost: u64,
    /// Packets whose payload was rejected or only partly applied.
    pub rejected_packets: u64,
    /// Payload headers that broke a packetization rule.
    pub header_violations: u64,
    /// Frames delivered to the sink.
    pub frames_emitted: u64,
    /// Delivered frames flagged [`FrameFlags::PACKET_CORRUPT`].
    pub corrupt_frames: u64,
    /// Lossy frames withheld because corrupt delivery is disabled.
    pub frames_dropped: u64,
}
