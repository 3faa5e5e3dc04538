use rand::RngExt;

use crate::error::{ParseErrorKind, Result};

/// Size of the RTP fixed header (RFC 3550 §5.1).
pub const RTP_HEADER_LEN: usize = 12;

/// A parsed RTP packet borrowing its payload from the input buffer.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                  CSRC list (CC * 4 bytes)                     |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |   profile (16)                |   extension length (words)    |
/// |                  extension data (X = 1)                       |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                  payload ...  | padding ... | pad count       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Header extensions are skipped, not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse a raw RTP packet.
    ///
    /// ```
    /// use av1_rtp::media::rtp::RtpPacket;
    ///
    /// let raw = [0x80, 0xE0, 0x00, 0x07, 0, 0, 0x0B, 0xB8, 0, 0, 0, 1, 0x10, 0x30];
    /// let pkt = RtpPacket::parse(&raw).unwrap();
    /// assert!(pkt.marker);
    /// assert_eq!(pkt.payload_type, 96);
    /// assert_eq!(pkt.sequence, 7);
    /// assert_eq!(pkt.timestamp, 3000);
    /// assert_eq!(pkt.payload, &[0x10, 0x30]);
    /// ```
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_LEN {
            return Err(ParseErrorKind::TooShort.into());
        }
        if data[0] >> 6 != 2 {
            return Err(ParseErrorKind::BadVersion.into());
        }

        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0f) as usize;

        let mut offset = RTP_HEADER_LEN + csrc_count * 4;
        if offset > data.len() {
            return Err(ParseErrorKind::BadHeaderLength.into());
        }

        if extension {
            if offset + 4 > data.len() {
                return Err(ParseErrorKind::BadHeaderLength.into());
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if offset > data.len() {
                return Err(ParseErrorKind::BadHeaderLength.into());
            }
        }

        let mut end = data.len();
        if padding {
            let pad = data[end - 1] as usize;
            if pad == 0 || offset + pad > end {
                return Err(ParseErrorKind::BadPadding.into());
            }
            end -= pad;
        }

        Ok(Self {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7f,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            payload: &data[offset..end],
        })
    }
}

/// Sender-side RTP fixed header state (RFC 3550 §5.1).
///
/// Manages the wrapping 16-bit sequence number, the media timestamp and the
/// SSRC for a packetizer. Version is always 2; padding, extension and CSRC
/// count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpHeader {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP header state created"
        );
        Self {
            pt,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        let ssrc = rand::rng().random::<u32>();
        Self::new(pt, ssrc)
    }

    /// Sequence number the next [`write`](Self::write) will use.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Serialize a 12-byte fixed header and advance the sequence number.
    ///
    /// For AV1 the marker bit is set on the last packet of a temporal unit.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_LEN] {
        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = 2 << 6;
        header[1] = ((marker as u8) << 7) | (self.pt & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Advance the media timestamp, wrapping at 2^32 like the wire field.
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment);
    }
}
