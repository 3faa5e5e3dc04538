//! OBU header inspection and low-overhead bitstream parsing (AV1 §5.3).
//!
//! ```text
//!  0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+
//! |F|  type |X|S|R|
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! `X` (extension flag) means a second header byte follows; `S` means a
//! leb128 `obu_size` follows the header.

use std::ops::Range;

use super::leb128;
use crate::error::{DepayError, Result};

pub const OBU_EXTENSION_FLAG: u8 = 0b0000_0100;
pub const OBU_HAS_SIZE_FIELD: u8 = 0b0000_0010;
const OBU_TYPE_MASK: u8 = 0b0111_1000;

/// A temporal delimiter OBU with an explicit zero size.
pub const TEMPORAL_DELIMITER: [u8; 2] = [
    ((ObuType::TemporalDelimiter as u8) << 3) | OBU_HAS_SIZE_FIELD,
    0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObuType {
    SequenceHeader = 1,
    TemporalDelimiter = 2,
    FrameHeader = 3,
    TileGroup = 4,
    Metadata = 5,
    Frame = 6,
    RedundantFrameHeader = 7,
    TileList = 8,
    Padding = 15,
}

impl ObuType {
    pub fn from_header(header: u8) -> Option<Self> {
        match (header & OBU_TYPE_MASK) >> 3 {
            1 => Some(Self::SequenceHeader),
            2 => Some(Self::TemporalDelimiter),
            3 => Some(Self::FrameHeader),
            4 => Some(Self::TileGroup),
            5 => Some(Self::Metadata),
            6 => Some(Self::Frame),
            7 => Some(Self::RedundantFrameHeader),
            8 => Some(Self::TileList),
            15 => Some(Self::Padding),
            _ => None,
        }
    }
}

/// Length of the OBU header: 1 byte, or 2 with the extension flag.
pub fn header_len(header: u8) -> usize {
    if header & OBU_EXTENSION_FLAG != 0 { 2 } else { 1 }
}

/// One OBU borrowed from a low-overhead bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obu<'a> {
    pub header: u8,
    pub extension: Option<u8>,
    pub payload: &'a [u8],
}

impl Obu<'_> {
    pub fn obu_type(&self) -> Option<ObuType> {
        ObuType::from_header(self.header)
    }

    /// Header, extension and payload without a size field, as carried
    /// inside RTP.
    pub fn to_rtp_element(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.payload.len());
        out.push(self.header & !OBU_HAS_SIZE_FIELD);
        out.extend(self.extension);
        out.extend_from_slice(self.payload);
        out
    }
}

/// Parse a low-overhead bitstream into OBUs.
///
/// An OBU without a size field extends to the end of `data`.
pub fn parse_obus(data: &[u8]) -> Result<Vec<Obu<'_>>> {
    Ok(parse_spans(data)?.into_iter().map(|(_, obu)| obu).collect())
}

/// Parse OBUs together with the byte range each one occupies in `data`.
fn parse_spans(data: &[u8]) -> Result<Vec<(Range<usize>, Obu<'_>)>> {
    let mut obus = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let start = pos;
        let header = data[pos];
        pos += 1;

        let extension = if header & OBU_EXTENSION_FLAG != 0 {
            let ext = *data
                .get(pos)
                .ok_or(DepayError::MalformedObu { offset: start })?;
            pos += 1;
            Some(ext)
        } else {
            None
        };

        let size = if header & OBU_HAS_SIZE_FIELD != 0 {
            let (size, consumed) = leb128::decode(&data[pos..]);
            if consumed == 0 {
                return Err(DepayError::MalformedObu { offset: start });
            }
            pos += consumed;
            usize::try_from(size).map_err(|_| DepayError::MalformedObu { offset: start })?
        } else {
            data.len() - pos
        };

        let end = pos
            .checked_add(size)
            .filter(|&end| end <= data.len())
            .ok_or(DepayError::MalformedObu { offset: start })?;

        obus.push((
            start..end,
            Obu {
                header,
                extension,
                payload: &data[pos..end],
            },
        ));
        pos = end;
    }

    Ok(obus)
}

/// Split a low-overhead bitstream into temporal units.
///
/// Every temporal delimiter OBU starts a new unit; the delimiter stays at
/// the head of the slice it starts. Data before the first delimiter forms
/// its own unit.
pub fn split_temporal_units(data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut units = Vec::new();
    let mut unit_start = 0;

    for (span, obu) in parse_spans(data)? {
        if obu.obu_type() == Some(ObuType::TemporalDelimiter) && span.start > unit_start {
            units.push(&data[unit_start..span.start]);
            unit_start = span.start;
        }
    }
    if data.len() > unit_start {
        units.push(&data[unit_start..]);
    }

    Ok(units)
}
