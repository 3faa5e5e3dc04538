//! Little-endian base-128 integers (AV1 §4.10.5).
//!
//! Every byte carries 7 value bits, least significant group first; the high
//! bit is set when another byte follows.

/// At most 8 groups are read, which covers every value AV1 allows.
pub const MAX_GROUPS: usize = 8;

/// Width of the size field the depacketizer reserves for every OBU.
pub const SIZE_FIELD_LEN: usize = 3;

/// Largest value a [`SIZE_FIELD_LEN`]-byte field can carry (2^21 - 1).
pub const MAX_SIZE_FIELD_VALUE: usize = (1 << (7 * SIZE_FIELD_LEN)) - 1;

/// Decode a leb128 value from the start of `data`.
///
/// Returns the value and the number of bytes consumed. Reading stops at the
/// first byte without the continuation bit, after 8 groups, or at the end of
/// `data`, whichever comes first.
///
/// ```
/// use av1_rtp::media::av1::leb128;
///
/// assert_eq!(leb128::decode(&[0x05]), (5, 1));
/// assert_eq!(leb128::decode(&[0xE5, 0x8E, 0x26, 0xFF]), (624_485, 3));
/// assert_eq!(leb128::decode(&[]), (0, 0));
/// ```
pub fn decode(data: &[u8]) -> (u64, usize) {
    let mut value = 0u64;
    let mut consumed = 0;
    for (i, &byte) in data.iter().take(MAX_GROUPS).enumerate() {
        value |= u64::from(byte & 0x7f) << (i * 7);
        consumed = i + 1;
        if byte & 0x80 == 0 {
            break;
        }
    }
    (value, consumed)
}

/// Encode `value` with the minimal number of groups, writing at most
/// `out.len()` bytes. Returns the number of bytes written.
///
/// A value that needs more than `out.len()` bytes is truncated; use
/// [`encoded_len`] to size the output first.
pub fn encode(mut value: u64, out: &mut [u8]) -> usize {
    let mut written = 0;
    while written < out.len() && written < MAX_GROUPS {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        out[written] = byte;
        written += 1;
        if value == 0 {
            break;
        }
    }
    written
}

/// Encode `value` into exactly `out.len()` bytes, padding with
/// continuation groups so every byte of the field is initialized.
///
/// Returns `false` (leaving `out` untouched) when the value does not fit.
///
/// ```
/// use av1_rtp::media::av1::leb128;
///
/// let mut field = [0u8; 3];
/// assert!(leb128::encode_padded(5, &mut field));
/// assert_eq!(field, [0x85, 0x80, 0x00]);
/// assert_eq!(leb128::decode(&field), (5, 3));
/// ```
pub fn encode_padded(value: u64, out: &mut [u8]) -> bool {
    let width = out.len();
    if width == 0 || width > MAX_GROUPS || value >> (7 * width) != 0 {
        return false;
    }
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = ((value >> (7 * i)) & 0x7f) as u8;
        if i + 1 < width {
            *byte |= 0x80;
        }
    }
    true
}

/// Number of bytes the minimal encoding of `value` occupies.
pub fn encoded_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}
