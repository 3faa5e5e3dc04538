//! End-to-end: packetize temporal units, feed the RTP packets through the
//! depacketizer (optionally dropping some), and check what comes out.

use std::cell::RefCell;
use std::rc::Rc;

use av1_rtp::media::Frame;
use av1_rtp::media::av1::leb128;
use av1_rtp::media::av1::obu::{self, ObuType, TEMPORAL_DELIMITER};
use av1_rtp::transport::{FramedReader, write_framed};
use av1_rtp::{
    Av1Depacketizer, Av1Packetizer, DepacketizerConfig, DepayError, Depacketizer, FrameFlags,
    Packetizer,
};

#[derive(Debug, Clone)]
struct Delivered {
    data: Vec<u8>,
    timestamp: u32,
    flags: FrameFlags,
}

type Sink = Rc<RefCell<Vec<Delivered>>>;

fn depacketizer(config: DepacketizerConfig) -> (Av1Depacketizer<impl FnMut(Frame<'_>)>, Sink) {
    let frames: Sink = Default::default();
    let out = frames.clone();
    let depay = Av1Depacketizer::with_config(
        move |frame: Frame<'_>| {
            out.borrow_mut().push(Delivered {
                data: frame.data.to_vec(),
                timestamp: frame.timestamp,
                flags: frame.flags,
            })
        },
        config,
    );
    (depay, frames)
}

fn allow_corrupt() -> DepacketizerConfig {
    DepacketizerConfig {
        allow_corrupt: true,
        ..Default::default()
    }
}

/// Encode one OBU in low-overhead format (size field present).
fn sized_obu(obu_type: ObuType, extension: Option<u8>, payload: &[u8]) -> Vec<u8> {
    let mut header = ((obu_type as u8) << 3) | obu::OBU_HAS_SIZE_FIELD;
    if extension.is_some() {
        header |= obu::OBU_EXTENSION_FLAG;
    }
    let mut out = vec![header];
    out.extend(extension);
    let mut size = [0u8; 8];
    let n = leb128::encode(payload.len() as u64, &mut size);
    out.extend_from_slice(&size[..n]);
    out.extend_from_slice(payload);
    out
}

fn temporal_unit(obus: &[Vec<u8>]) -> Vec<u8> {
    let mut unit = TEMPORAL_DELIMITER.to_vec();
    for o in obus {
        unit.extend_from_slice(o);
    }
    unit
}

/// (header without size flag, extension, payload) for every OBU that
/// travels over RTP.
fn transmitted(data: &[u8]) -> Vec<(u8, Option<u8>, Vec<u8>)> {
    obu::parse_obus(data)
        .unwrap()
        .into_iter()
        .filter(|o| o.obu_type() != Some(ObuType::TemporalDelimiter))
        .map(|o| (o.header & !obu::OBU_HAS_SIZE_FIELD, o.extension, o.payload.to_vec()))
        .collect()
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn gap_free_stream_round_trips() {
    let units: Vec<Vec<u8>> = (0..10u8)
        .map(|i| {
            let mut obus = Vec::new();
            if i == 0 {
                obus.push(sized_obu(ObuType::SequenceHeader, None, &pattern(12, i)));
            }
            obus.push(sized_obu(ObuType::Metadata, None, &pattern(5, i)));
            obus.push(sized_obu(ObuType::Frame, Some(0x28), &pattern(900 + i as usize * 700, i)));
            temporal_unit(&obus)
        })
        .collect();

    let mut packetizer = Av1Packetizer::new(96, 0x0102_0304).with_mtu(1200);
    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());

    for unit in &units {
        for packet in packetizer.packetize(unit, 3000).unwrap() {
            depay.input(&packet).unwrap();
        }
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), units.len());
    for (i, (frame, unit)) in frames.iter().zip(&units).enumerate() {
        assert_eq!(frame.timestamp, 3000 * i as u32);
        assert!(frame.flags.is_empty(), "frame {i} flagged {:?}", frame.flags);
        assert_eq!(transmitted(&frame.data), transmitted(unit));
    }
    assert_eq!(depay.stats().frames_emitted, 10);
    assert_eq!(depay.stats().packets_lost, 0);
}

#[test]
fn output_size_fields_are_three_byte_leb128() {
    let unit = temporal_unit(&[sized_obu(ObuType::Frame, None, &[0xAA; 200])]);
    let mut packetizer = Av1Packetizer::new(96, 1);
    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());
    for packet in packetizer.packetize(&unit, 3000).unwrap() {
        depay.input(&packet).unwrap();
    }

    let frames = frames.borrow();
    let data = &frames[0].data;
    assert_eq!(data[0], 0x32);
    assert_eq!(leb128::decode(&data[1..4]), (200, 3));
    assert_eq!(data.len(), 1 + 3 + 200);
}

#[test]
fn largest_representable_obu_round_trips() {
    let payload = pattern(leb128::MAX_SIZE_FIELD_VALUE, 7);
    let unit = temporal_unit(&[sized_obu(ObuType::Frame, None, &payload)]);

    let mut packetizer = Av1Packetizer::new(96, 1);
    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());
    let packets = packetizer.packetize(&unit, 3000).unwrap();
    assert!(packets.len() > 1000);
    for packet in &packets {
        depay.input(packet).unwrap();
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0].data[1..4], &[0xFF, 0xFF, 0x7F]);
    assert_eq!(transmitted(&frames[0].data), transmitted(&unit));
}

#[test]
fn obu_beyond_size_field_range_is_rejected() {
    let payload = vec![0u8; leb128::MAX_SIZE_FIELD_VALUE + 1];
    let unit = temporal_unit(&[sized_obu(ObuType::Frame, None, &payload)]);

    let mut packetizer = Av1Packetizer::new(96, 1);
    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());
    let results: Vec<_> = packetizer
        .packetize(&unit, 3000)
        .unwrap()
        .iter()
        .map(|p| depay.input(p))
        .collect();

    assert!(results.iter().any(|r| matches!(r, Err(DepayError::BufferTooLarge { .. }))));
    assert!(frames.borrow().is_empty());
    assert_eq!(depay.stats().frames_dropped, 1);
}

/// Ten 500-byte frame OBUs. At an MTU of 600 every packet after the first
/// opens with a continuation and then starts a fresh OBU.
fn fragmented_unit(seed: u8) -> Vec<u8> {
    let obus: Vec<Vec<u8>> = (0..10u8)
        .map(|i| sized_obu(ObuType::Frame, None, &pattern(500, seed.wrapping_add(i))))
        .collect();
    temporal_unit(&obus)
}

#[test]
fn dropped_packet_within_frame_flags_corrupt() {
    let unit = fragmented_unit(1);
    let next = temporal_unit(&[sized_obu(ObuType::Frame, None, &pattern(10, 2))]);

    let mut packetizer = Av1Packetizer::new(96, 1).with_mtu(600);
    let (mut depay, frames) = depacketizer(allow_corrupt());

    let packets = packetizer.packetize(&unit, 3000).unwrap();
    assert!(packets.len() >= 6);
    for (i, packet) in packets.iter().enumerate() {
        if i == 2 {
            continue;
        }
        depay.input(packet).unwrap();
    }
    for packet in packetizer.packetize(&next, 3000).unwrap() {
        depay.input(&packet).unwrap();
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    assert!(frames[0].flags.contains(FrameFlags::PACKET_CORRUPT));
    assert!(frames[0].flags.contains(FrameFlags::PACKET_LOST));
    // Only OBUs that started after the gap survive, each intact.
    let original = transmitted(&unit);
    let survived = transmitted(&frames[0].data);
    assert!(!survived.is_empty() && survived.len() < original.len());
    assert_eq!(survived[..], original[original.len() - survived.len()..]);
    // The transient bit does not leak into the following intact frame.
    assert!(frames[1].flags.is_empty());
    assert_eq!(transmitted(&frames[1].data), transmitted(&next));
}

#[test]
fn dropped_packet_at_boundary_flags_both_frames() {
    let first = temporal_unit(&[
        sized_obu(ObuType::Frame, None, &pattern(100, 1)),
        sized_obu(ObuType::Frame, None, &pattern(100, 2)),
    ]);
    let second = temporal_unit(&[
        sized_obu(ObuType::Frame, None, &pattern(100, 3)),
        sized_obu(ObuType::Frame, None, &pattern(100, 4)),
    ]);

    // Tiny MTU: every OBU spans several packets.
    let mut packetizer = Av1Packetizer::new(96, 1).with_mtu(60);
    let (mut depay, frames) = depacketizer(allow_corrupt());

    let first_packets = packetizer.packetize(&first, 3000).unwrap();
    let second_packets = packetizer.packetize(&second, 3000).unwrap();

    // Lose the marker packet of the first unit.
    for packet in &first_packets[..first_packets.len() - 1] {
        depay.input(packet).unwrap();
    }
    for packet in &second_packets {
        depay.input(packet).unwrap();
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp, 0);
    assert!(frames[0].flags.contains(FrameFlags::PACKET_CORRUPT));
    assert_eq!(frames[1].timestamp, 3000);
    assert!(frames[1].flags.contains(FrameFlags::PACKET_CORRUPT));
    // Content of the second unit still arrived intact.
    assert_eq!(transmitted(&frames[1].data), transmitted(&second));
}

#[test]
fn corrupt_frames_withheld_by_default() {
    let units: Vec<Vec<u8>> = (0..3u8).map(|i| fragmented_unit(i * 10)).collect();

    let mut packetizer = Av1Packetizer::new(96, 1).with_mtu(600);
    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());

    for (u, unit) in units.iter().enumerate() {
        for (i, packet) in packetizer.packetize(unit, 3000).unwrap().iter().enumerate() {
            if u == 1 && i == 2 {
                continue;
            }
            depay.input(packet).unwrap();
        }
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp, 0);
    assert!(frames[0].flags.is_empty());
    // The unit after the withheld one reports the loss once.
    assert_eq!(frames[1].timestamp, 6000);
    assert_eq!(frames[1].flags, FrameFlags::PACKET_LOST);
    assert_eq!(transmitted(&frames[1].data), transmitted(&units[2]));
    assert_eq!(depay.stats().frames_dropped, 1);
}

#[test]
fn more_than_255_obus_keeps_first_255() {
    let obus: Vec<Vec<u8>> = (0..300u32)
        .map(|i| sized_obu(ObuType::Metadata, None, &[i as u8]))
        .collect();
    let unit = temporal_unit(&obus);

    let mut packetizer = Av1Packetizer::new(96, 1);
    let (mut depay, frames) = depacketizer(allow_corrupt());

    let errors: Vec<DepayError> = packetizer
        .packetize(&unit, 3000)
        .unwrap()
        .iter()
        .filter_map(|p| depay.input(p).err())
        .collect();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|e| matches!(e, DepayError::TooManyObus { max: 255 })));

    let frames = frames.borrow();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].flags.contains(FrameFlags::PACKET_CORRUPT));
    let got = transmitted(&frames[0].data);
    assert_eq!(got.len(), 255);
    assert_eq!(got, transmitted(&unit)[..255].to_vec());
}

#[test]
fn extension_header_at_packet_edge_round_trips() {
    // At MTU 10 the extension OBU's 2-byte header would start right after
    // the first OBU with a single byte of room left.
    let unit = temporal_unit(&[
        sized_obu(ObuType::Frame, None, &pattern(5, 1)),
        sized_obu(ObuType::Frame, Some(0x28), &pattern(10, 2)),
    ]);

    let mut packetizer = Av1Packetizer::new(96, 1).with_mtu(10);
    let (mut depay, frames) = depacketizer(allow_corrupt());
    for packet in packetizer.packetize(&unit, 3000).unwrap() {
        depay.input(&packet).unwrap();
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].flags.is_empty());
    assert_eq!(transmitted(&frames[0].data), transmitted(&unit));
}

#[test]
fn minimum_mtu_round_trips() {
    // Three-byte payloads carry one OBU byte each, so every extension
    // header is split between two packets.
    let units: Vec<Vec<u8>> = (0..3u8)
        .map(|i| {
            temporal_unit(&[
                sized_obu(ObuType::SequenceHeader, None, &pattern(4, i)),
                sized_obu(ObuType::Frame, Some(0x28 + i), &pattern(20, i)),
                sized_obu(ObuType::Frame, Some(0x30), &pattern(7, i)),
            ])
        })
        .collect();

    let mut packetizer = Av1Packetizer::new(96, 1).with_mtu(3);
    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());
    for unit in &units {
        for packet in packetizer.packetize(unit, 3000).unwrap() {
            depay.input(&packet).unwrap();
        }
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), units.len());
    for (frame, unit) in frames.iter().zip(&units) {
        assert!(frame.flags.is_empty());
        assert_eq!(transmitted(&frame.data), transmitted(unit));
    }
}

#[test]
fn new_sequence_with_continuation_is_surfaced() {
    let (mut depay, _frames) = depacketizer(DepacketizerConfig::default());
    let packet = [
        0x80, 0xE0, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 1, // RTP header, M=1
        0b1000_1000, 0x01, 0x30, // Z=1, N=1
    ];
    let outcome = depay.input(&packet).unwrap();
    assert!(outcome.header_violation);
    assert_eq!(depay.stats().header_violations, 1);
}

#[test]
fn framed_capture_round_trip() {
    let units: Vec<Vec<u8>> = (0..4u8)
        .map(|i| temporal_unit(&[sized_obu(ObuType::Frame, None, &pattern(2500, i))]))
        .collect();

    let mut packetizer = Av1Packetizer::new(96, 9);
    let mut capture = Vec::new();
    for unit in &units {
        for packet in packetizer.packetize(unit, 3000).unwrap() {
            write_framed(&mut capture, &packet).unwrap();
        }
    }

    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());
    for packet in FramedReader::new(capture.as_slice()) {
        depay.input(&packet.unwrap()).unwrap();
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), 4);
    for (frame, unit) in frames.iter().zip(&units) {
        assert_eq!(transmitted(&frame.data), transmitted(unit));
    }
}

#[test]
fn teardown_releases_pending_frame_without_emitting() {
    let unit = temporal_unit(&[sized_obu(ObuType::Frame, None, &pattern(3000, 1))]);
    let mut packetizer = Av1Packetizer::new(96, 1);
    let (mut depay, frames) = depacketizer(DepacketizerConfig::default());

    let packets = packetizer.packetize(&unit, 3000).unwrap();
    depay.input(&packets[0]).unwrap();
    drop(depay);

    assert!(frames.borrow().is_empty());
}
