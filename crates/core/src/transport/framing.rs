use std::io::{ErrorKind, Read, Write};

use crate::error::Result;

/// Length prefix of one framed packet (RFC 4571 §2).
const PREFIX_LEN: usize = 2;

/// Largest packet a 16-bit length prefix can describe.
pub const MAX_FRAMED_PACKET: usize = u16::MAX as usize;

/// Reads RTP packets from an RFC 4571 stream: each packet is preceded by
/// its length as a 16-bit big-endian integer.
///
/// Used for capture files and RTP-over-TCP. Iteration ends cleanly at EOF
/// on a packet boundary; EOF inside a packet is an
/// [`UnexpectedEof`](ErrorKind::UnexpectedEof) error.
///
/// ```
/// use av1_rtp::transport::framing::FramedReader;
///
/// let data = [0x00, 0x02, 0xAA, 0xBB, 0x00, 0x01, 0xCC];
/// let packets: Vec<Vec<u8>> = FramedReader::new(&data[..])
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(packets, vec![vec![0xAA, 0xBB], vec![0xCC]]);
/// ```
pub struct FramedReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> FramedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    /// Read the next packet, `None` at a clean end of stream.
    pub fn read_packet(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; PREFIX_LEN];
        let mut filled = 0;
        while filled < PREFIX_LEN {
            match self.reader.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let len = u16::from_be_bytes(prefix) as usize;
        let mut packet = vec![0u8; len];
        self.reader.read_exact(&mut packet)?;
        Ok(Some(packet))
    }
}

impl<R: Read> Iterator for FramedReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_packet() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Write one packet with its RFC 4571 length prefix.
///
/// Packets longer than [`MAX_FRAMED_PACKET`] cannot be framed and fail with
/// [`InvalidInput`](ErrorKind::InvalidInput).
pub fn write_framed<W: Write>(writer: &mut W, packet: &[u8]) -> Result<()> {
    let len = u16::try_from(packet.len()).map_err(|_| {
        std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("packet of {} bytes exceeds RFC 4571 frame limit", packet.len()),
        )
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(packet)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepayError;

    #[test]
    fn write_then_read() {
        let mut out = Vec::new();
        write_framed(&mut out, &[1, 2, 3]).unwrap();
        write_framed(&mut out, &[]).unwrap();
        assert_eq!(out, vec![0, 3, 1, 2, 3, 0, 0]);

        let mut reader = FramedReader::new(out.as_slice());
        assert_eq!(reader.read_packet().unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(reader.read_packet().unwrap(), Some(vec![]));
        assert_eq!(reader.read_packet().unwrap(), None);
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let data = [0x00, 0x05, 0xAA];
        let mut reader = FramedReader::new(&data[..]);
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, DepayError::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof));
        assert!(reader.next().is_none());
    }

    #[test]
    fn truncated_prefix_is_an_error() {
        let data = [0x00];
        let mut reader = FramedReader::new(&data[..]);
        assert!(reader.read_packet().is_err());
    }

    #[test]
    fn oversized_packet_is_rejected() {
        let mut out = Vec::new();
        let big = vec![0u8; MAX_FRAMED_PACKET + 1];
        assert!(write_framed(&mut out, &big).is_err());
        assert!(out.is_empty());
    }
}
