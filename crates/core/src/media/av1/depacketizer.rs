use super::aggregation::AggregationHeader;
use super::buffer::FrameBuffer;
use super::leb128::{self, MAX_SIZE_FIELD_VALUE, SIZE_FIELD_LEN};
use super::obu::{self, OBU_EXTENSION_FLAG, OBU_HAS_SIZE_FIELD};
use super::obu_table::{MAX_OBUS, ObuTable};
use crate::error::{DepayError, ParseErrorKind, Result};
use crate::media::rtp::RtpPacket;
use crate::media::{Depacketizer, DepacketizerStats, Frame, FrameFlags, InputOutcome};

/// Default upper bound for one reassembled temporal unit (10 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Tunables for [`Av1Depacketizer`].
#[derive(Debug, Clone)]
pub struct DepacketizerConfig {
    /// Largest temporal unit, in bytes, the frame buffer may hold.
    pub max_frame_size: usize,
    /// OBU records per temporal unit; capped at 255.
    pub max_obus: usize,
    /// Deliver frames that lost packets (flagged
    /// [`FrameFlags::PACKET_CORRUPT`]) instead of dropping them.
    pub allow_corrupt: bool,
}

impl Default for DepacketizerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_obus: MAX_OBUS,
            allow_corrupt: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    AwaitingFirstPacket,
    Assembling { timestamp: u32 },
}

/// AV1 RTP depacketizer.
///
/// Reassembles OBU elements and fragments from consecutive RTP packets of
/// one stream into temporal units, delivered to `sink` as low-overhead OBU
/// streams with every size field rewritten.
///
/// ## Frame boundaries
///
/// A temporal unit is complete when a packet carries the marker bit, when
/// the RTP timestamp changes, or when a packet starts a new coded video
/// sequence (aggregation header `N=1`, `Z=0`).
///
/// ## Loss
///
/// A sequence-number gap marks the frame being assembled as corrupt. If the
/// gap coincides with a timestamp change the lost packet may have belonged
/// to either side, so both the finished and the starting frame are marked.
/// Corrupt frames are dropped unless
/// [`DepacketizerConfig::allow_corrupt`] is set; the next delivered frame
/// then carries [`FrameFlags::PACKET_LOST`].
///
/// ```
/// use av1_rtp::media::Depacketizer;
/// use av1_rtp::media::av1::Av1Depacketizer;
///
/// let mut frames = Vec::new();
/// let mut depay = Av1Depacketizer::new(|frame: av1_rtp::media::Frame<'_>| {
///     frames.push(frame.data.to_vec());
/// });
///
/// // V=2, M=1, PT=96, seq=1, ts=3000; W=1 with a single frame OBU.
/// let packet = [0x80, 0xE0, 0, 1, 0, 0, 0x0B, 0xB8, 0, 0, 0, 1, 0x10, 0x30, 0xAA];
/// depay.input(&packet).unwrap();
/// drop(depay);
///
/// assert_eq!(frames, vec![vec![0x32, 0x81, 0x80, 0x00, 0xAA]]);
/// ```
pub struct Av1Depacketizer<F> {
    sink: F,
    config: DepacketizerConfig,
    state: TrackerState,
    last_sequence: u16,
    loss_pending: bool,
    flags: FrameFlags,
    buffer: FrameBuffer,
    obus: ObuTable,
    /// Leading bytes of an OBU whose header ended a packet (`Y=1`).
    partial_head: Vec<u8>,
    stats: DepacketizerStats,
}

impl<F> Av1Depacketizer<F>
where
    F: FnMut(Frame<'_>),
{
    pub fn new(sink: F) -> Self {
        Self::with_config(sink, DepacketizerConfig::default())
    }

    pub fn with_config(sink: F, config: DepacketizerConfig) -> Self {
        tracing::debug!(
            max_frame_size = config.max_frame_size,
            max_obus = config.max_obus,
            allow_corrupt = config.allow_corrupt,
            "AV1 depacketizer created"
        );
        Self {
            sink,
            buffer: FrameBuffer::new(config.max_frame_size),
            obus: ObuTable::new(config.max_obus),
            config,
            state: TrackerState::AwaitingFirstPacket,
            last_sequence: 0,
            loss_pending: false,
            flags: FrameFlags::empty(),
            partial_head: Vec::new(),
            stats: DepacketizerStats::default(),
        }
    }

    pub fn config(&self) -> &DepacketizerConfig {
        &self.config
    }

    /// Update sequence tracking. Returns `true` when packets were skipped.
    fn track_sequence(&mut self, sequence: u16) -> bool {
        if self.state == TrackerState::AwaitingFirstPacket {
            self.last_sequence = sequence.wrapping_sub(1);
        }

        let expected = self.last_sequence.wrapping_add(1);
        self.last_sequence = sequence;
        if sequence == expected {
            return false;
        }

        let missing = sequence.wrapping_sub(expected);
        self.stats.packets_lost += u64::from(missing);
        tracing::debug!(expected, got = sequence, missing, "RTP sequence gap");
        self.mark_loss();
        true
    }

    fn mark_loss(&mut self) {
        self.loss_pending = true;
        self.flags.insert(FrameFlags::PACKET_LOST);
    }

    /// Throw away the partially assembled frame, keeping its loss state.
    fn discard_frame(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(bytes = self.buffer.len(), "discarding partial frame after loss");
        }
        self.buffer.reset();
        self.obus.clear();
        self.partial_head.clear();
    }

    /// Finish the current frame: deliver it when it has content and is
    /// either intact or corrupt delivery is allowed, then start afresh.
    fn emit_frame(&mut self) -> usize {
        let corrupt = self.loss_pending;
        let mut delivered = false;

        if self.obus.has_content() {
            if !corrupt || self.config.allow_corrupt {
                self.obus.finalize_all(&mut self.buffer);

                let mut flags = self.flags;
                if corrupt {
                    flags.insert(FrameFlags::PACKET_CORRUPT);
                }
                let timestamp = match self.state {
                    TrackerState::Assembling { timestamp } => timestamp,
                    TrackerState::AwaitingFirstPacket => 0,
                };

                tracing::debug!(
                    ts = timestamp,
                    len = self.buffer.len(),
                    obus = self.obus.len(),
                    flags = flags.bits(),
                    "temporal unit complete"
                );
                (self.sink)(Frame {
                    data: self.buffer.as_slice(),
                    timestamp,
                    flags,
                });

                self.flags.remove(FrameFlags::PACKET_LOST);
                self.stats.frames_emitted += 1;
                if corrupt {
                    self.stats.corrupt_frames += 1;
                }
                delivered = true;
            } else {
                tracing::debug!(bytes = self.buffer.len(), "dropping corrupt temporal unit");
                self.stats.frames_dropped += 1;
            }
        }

        if corrupt && !delivered {
            self.flags.insert(FrameFlags::PACKET_LOST);
        }
        self.loss_pending = false;
        self.buffer.reset();
        self.obus.clear();
        self.partial_head.clear();
        delivered as usize
    }

    fn input_packet(&mut self, data: &[u8]) -> Result<InputOutcome> {
        let packet = RtpPacket::parse(data)?;
        if packet.payload.is_empty() {
            return Err(ParseErrorKind::EmptyPayload.into());
        }
        self.stats.packets += 1;

        tracing::trace!(
            seq = packet.sequence,
            ts = packet.timestamp,
            marker = packet.marker,
            len = packet.payload.len(),
            "AV1 RTP packet"
        );

        let mut outcome = InputOutcome::default();
        let gap = self.track_sequence(packet.sequence);

        match self.state {
            TrackerState::Assembling { timestamp } if timestamp != packet.timestamp => {
                outcome.frames_emitted += self.emit_frame();
                if gap {
                    // The lost packet may have opened this frame as well.
                    self.mark_loss();
                }
            }
            TrackerState::Assembling { .. } if gap => self.discard_frame(),
            _ => {}
        }
        self.state = TrackerState::Assembling {
            timestamp: packet.timestamp,
        };

        let header = AggregationHeader::parse(packet.payload[0]);
        if let Some(violation) = header.violation() {
            tracing::warn!(
                seq = packet.sequence,
                ?violation,
                "aggregation header breaks AV1 RTP rules"
            );
            self.stats.header_violations += 1;
            outcome.header_violation = true;
        }
        if header.starts_sequence() && self.obus.has_content() {
            outcome.frames_emitted += self.emit_frame();
        }

        let appended = self.reassemble(header, &packet.payload[1..]);

        if packet.marker {
            outcome.frames_emitted += self.emit_frame();
        }

        match appended {
            Ok(()) => Ok(outcome),
            Err(err) => {
                self.stats.rejected_packets += 1;
                tracing::debug!(seq = packet.sequence, error = %err, "AV1 payload rejected");
                Err(err)
            }
        }
    }

    /// Append the OBU elements of one payload (aggregation header removed).
    fn reassemble(&mut self, header: AggregationHeader, payload: &[u8]) -> Result<()> {
        let elements = split_elements(header, payload).inspect_err(|_| self.mark_loss())?;

        if !header.z && (self.obus.is_open() || !self.partial_head.is_empty()) {
            tracing::debug!("fragment tail missing, closing open OBU");
            self.mark_loss();
            self.obus.close();
            self.partial_head.clear();
        }

        let last = elements.len().saturating_sub(1);
        for (index, element) in elements.into_iter().enumerate() {
            let continues = header.y && index == last;
            let appended = if index == 0 && header.z {
                self.append_continuation(element, continues)
            } else {
                self.obus.close();
                self.append_obu(element, continues)
            };

            if let Err(err) = appended {
                self.mark_loss();
                self.obus.close();
                return Err(err);
            }
        }

        if !header.y {
            self.obus.close();
        }
        Ok(())
    }

    /// Extend the open OBU with a fragment from a later packet.
    fn append_continuation(&mut self, fragment: &[u8], continues: bool) -> Result<()> {
        if !self.partial_head.is_empty() {
            let mut head = std::mem::take(&mut self.partial_head);
            head.extend_from_slice(fragment);
            return self.append_obu(&head, continues);
        }

        let Some(current) = self.obus.current_length() else {
            if !fragment.is_empty() {
                tracing::debug!(
                    len = fragment.len(),
                    "continuation without fragment head, dropped"
                );
                self.mark_loss();
            }
            return Ok(());
        };

        let total = current + fragment.len();
        if total > MAX_SIZE_FIELD_VALUE {
            return Err(DepayError::BufferTooLarge {
                requested: total,
                max: MAX_SIZE_FIELD_VALUE,
            });
        }

        self.buffer.append(fragment)?;
        self.obus.extend_current(fragment.len());
        tracing::trace!(len = fragment.len(), total, "OBU fragment appended");
        Ok(())
    }

    /// Start a new OBU: header (size flag forced on), optional extension,
    /// a reserved size field, then the payload.
    ///
    /// When `continues` is set the element may stop inside the OBU header;
    /// those bytes are held until the next fragment completes them.
    fn append_obu(&mut self, element: &[u8], continues: bool) -> Result<()> {
        let Some(&header) = element.first() else {
            return Ok(());
        };

        let header_len = obu::header_len(header);
        let Some(head) = head_len(element) else {
            if continues {
                tracing::trace!(len = element.len(), "OBU header split across packets");
                self.partial_head.clear();
                self.partial_head.extend_from_slice(element);
                return Ok(());
            }
            return Err(truncated_head(element));
        };
        // The element length is authoritative; any sender size field is dropped.
        let body = &element[head..];

        if body.len() > MAX_SIZE_FIELD_VALUE {
            return Err(DepayError::BufferTooLarge {
                requested: body.len(),
                max: MAX_SIZE_FIELD_VALUE,
            });
        }

        self.buffer.reserve(header_len + SIZE_FIELD_LEN + body.len())?;
        self.obus.open_record(self.buffer.len())?;

        self.buffer.append(&[header | OBU_HAS_SIZE_FIELD])?;
        if header & OBU_EXTENSION_FLAG != 0 {
            self.buffer.append(&element[1..2])?;
        }
        self.buffer.append(&[0; SIZE_FIELD_LEN])?;
        self.buffer.append(body)?;
        self.obus.extend_current(body.len());

        tracing::trace!(header, len = body.len(), "OBU element appended");
        Ok(())
    }
}

/// Split a payload into its OBU elements without touching any state, so a
/// malformed packet commits nothing.
fn split_elements(header: AggregationHeader, payload: &[u8]) -> Result<Vec<&[u8]>> {
    let mut elements = Vec::new();
    let mut pos = 0;
    let mut index = 0;

    while pos < payload.len() {
        let declared = if header.has_length_field(index) {
            let (len, consumed) = leb128::decode(&payload[pos..]);
            pos += consumed;
            usize::try_from(len).unwrap_or(usize::MAX)
        } else {
            payload.len() - pos
        };

        let available = payload.len() - pos;
        if declared > available {
            return Err(DepayError::TruncatedElement {
                declared,
                available,
            });
        }

        let element = &payload[pos..pos + declared];
        pos += declared;
        // A fragment continuation has no header of its own, and the last
        // element may end mid-header when the OBU continues (Y=1).
        let continuation = index == 0 && header.z;
        let split_head = header.y && pos == payload.len();
        if !element.is_empty() && !continuation && !split_head && head_len(element).is_none() {
            return Err(truncated_head(element));
        }

        elements.push(element);
        index += 1;
    }

    Ok(elements)
}

/// Length of the OBU header, extension byte and sender size field at the
/// start of `element`, or `None` when the element ends before them.
fn head_len(element: &[u8]) -> Option<usize> {
    let header = *element.first()?;
    let header_len = obu::header_len(header);
    if element.len() < header_len {
        return None;
    }
    if header & OBU_HAS_SIZE_FIELD == 0 {
        return Some(header_len);
    }

    let field = &element[header_len..];
    let (_, consumed) = leb128::decode(field);
    let last = *field.get(consumed.checked_sub(1)?)?;
    (last & 0x80 == 0 || consumed == leb128::MAX_GROUPS).then_some(header_len + consumed)
}

fn truncated_head(element: &[u8]) -> DepayError {
    let header_len = element.first().map_or(1, |&h| obu::header_len(h));
    DepayError::TruncatedElement {
        declared: header_len.max(element.len() + 1),
        available: element.len(),
    }
}

impl<F> Depacketizer for Av1Depacketizer<F>
where
    F: FnMut(Frame<'_>),
{
    fn input(&mut self, packet: &[u8]) -> Result<InputOutcome> {
        self.input_packet(packet)
    }

    fn flush(&mut self) -> usize {
        self.emit_frame()
    }

    fn stats(&self) -> DepacketizerStats {
        self.stats
    }

    fn codec_name(&self) -> &'static str {
        "AV1"
    }
}

impl<F> Drop for Av1Depacketizer<F> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.buffer.scrub();
    }
}
