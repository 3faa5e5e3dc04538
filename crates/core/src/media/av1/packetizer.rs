use super::aggregation::AggregationHeader;
use super::leb128;
use super::obu::{self, ObuType};
use crate::error::Result;
use crate::media::Packetizer;
use crate::media::rtp::RtpHeader;

/// Largest RTP payload (aggregation header included) per packet.
const DEFAULT_MTU: usize = 1400;

/// Smallest usable MTU: aggregation header, a 1-byte length, 1 OBU byte.
const MIN_MTU: usize = 3;

/// AV1 RTP packetizer.
///
/// Converts a temporal unit in low-overhead bitstream format into RTP
/// packets:
///
/// - Size fields are stripped from every OBU header; temporal delimiters,
///   tile lists and padding OBUs are not transmitted.
/// - Every OBU element is preceded by a leb128 length (`W = 0`).
/// - OBUs that do not fit are fragmented across packets, linked by the
///   `Y` flag on the packet holding the head and `Z` on the continuation.
/// - `N` is set on the first packet of a unit that carries a sequence
///   header; the marker bit is set on the last packet of the unit.
#[derive(Debug)]
pub struct Av1Packetizer {
    header: RtpHeader,
    mtu: usize,
}

/// A payload under construction.
#[derive(Debug, Default)]
struct PendingPayload {
    aggregation: AggregationHeader,
    body: Vec<u8>,
}

impl Av1Packetizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            mtu: DEFAULT_MTU,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            mtu: DEFAULT_MTU,
        }
    }

    /// Limit the RTP payload size; values below 3 bytes are raised to 3.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(MIN_MTU);
        self
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Build the RTP payloads (aggregation header included) for one unit.
    fn build_payloads(&self, unit: &[u8]) -> Result<Vec<Vec<u8>>> {
        let obus = obu::parse_obus(unit)?;
        let starts_sequence = obus
            .iter()
            .any(|o| o.obu_type() == Some(ObuType::SequenceHeader));

        let max_body = self.mtu - 1;
        let mut payloads = Vec::new();
        let mut current = PendingPayload::default();

        for element in obus
            .iter()
            .filter(|o| {
                !matches!(
                    o.obu_type(),
                    Some(ObuType::TemporalDelimiter | ObuType::TileList | ObuType::Padding)
                )
            })
            .map(|o| o.to_rtp_element())
        {
            let mut rest = element.as_slice();
            while !rest.is_empty() {
                let room = max_body - current.body.len();
                let whole = rest.len() + leb128::encoded_len(rest.len() as u64);

                if whole <= room {
                    push_element(&mut current.body, rest);
                    rest = &[];
                    continue;
                }

                let chunk = max_fragment(room);
                let at_head = rest.len() == element.len();
                let splits_header = at_head && chunk < obu::header_len(rest[0]);
                if chunk == 0 || (splits_header && !current.body.is_empty()) {
                    // The OBU header would not fit whole: close this payload first.
                    payloads.push(current.finish(false));
                    current = PendingPayload::default();
                    continue;
                }

                push_element(&mut current.body, &rest[..chunk]);
                rest = &rest[chunk..];
                payloads.push(current.finish(true));
                current = PendingPayload::default();
                current.aggregation.z = true;
            }
        }

        if !current.body.is_empty() {
            payloads.push(current.finish(false));
        }
        if starts_sequence && let Some(first) = payloads.first_mut() {
            first[0] |= AggregationHeader {
                n: true,
                ..Default::default()
            }
            .to_byte();
        }

        Ok(payloads)
    }
}

impl PendingPayload {
    fn finish(self, continues: bool) -> Vec<u8> {
        let aggregation = AggregationHeader {
            y: continues,
            ..self.aggregation
        };
        let mut payload = Vec::with_capacity(1 + self.body.len());
        payload.push(aggregation.to_byte());
        payload.extend_from_slice(&self.body);
        payload
    }
}

fn push_element(body: &mut Vec<u8>, element: &[u8]) {
    let mut length = [0u8; 8];
    let n = leb128::encode(element.len() as u64, &mut length);
    body.extend_from_slice(&length[..n]);
    body.extend_from_slice(element);
}

/// Largest fragment `n` with `n + leb128_len(n) <= room`.
fn max_fragment(room: usize) -> usize {
    let mut n = room.saturating_sub(1);
    while n > 0 && n + leb128::encoded_len(n as u64) > room {
        n -= 1;
    }
    n
}

impl Packetizer for Av1Packetizer {
    fn packetize(
        &mut self,
        encoded_data: &[u8],
        timestamp_increment: u32,
    ) -> Result<Vec<Vec<u8>>> {
        let payloads = self.build_payloads(encoded_data)?;
        let last = payloads.len().saturating_sub(1);

        let packets: Vec<Vec<u8>> = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let hdr = self.header.write(i == last);
                let mut packet = Vec::with_capacity(hdr.len() + payload.len());
                packet.extend_from_slice(&hdr);
                packet.extend_from_slice(&payload);
                packet
            })
            .collect();

        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            rtp_packets = packets.len(),
            unit_bytes = encoded_data.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "temporal unit packetized"
        );

        Ok(packets)
    }

    fn codec_name(&self) -> &'static str {
        "AV1"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    /// `a=rtpmap:<pt> AV1/90000` followed by the track control URL.
    fn sdp_attributes(&self) -> Vec<String> {
        vec![
            format!(
                "a=rtpmap:{} {}/{}",
                self.payload_type(),
                self.codec_name(),
                self.clock_rate()
            ),
            "a=control:track1".to_string(),
        ]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp()
    }
}
