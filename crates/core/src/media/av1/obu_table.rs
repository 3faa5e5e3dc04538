use super::buffer::FrameBuffer;
use super::leb128::{self, SIZE_FIELD_LEN};
use super::obu::OBU_EXTENSION_FLAG;
use crate::error::{DepayError, Result};

/// Protocol maximum of OBU elements tracked per temporal unit.
pub const MAX_OBUS: usize = 255;

/// Records are allocated in small batches.
const GROWTH_STEP: usize = 8;

/// Location of one reassembled OBU inside the [`FrameBuffer`].
///
/// `offset` points at the OBU header byte. `length` counts payload bytes
/// only (everything after the header, extension and size field) and is the
/// value written into the size field at emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObuRecord {
    pub offset: usize,
    pub length: usize,
}

/// Ordered, bounded index of the OBUs in the current temporal unit.
#[derive(Debug)]
pub struct ObuTable {
    records: Vec<ObuRecord>,
    max: usize,
    open: bool,
}

impl ObuTable {
    pub fn new(max: usize) -> Self {
        Self {
            records: Vec::new(),
            max: max.min(MAX_OBUS),
            open: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ObuRecord] {
        &self.records
    }

    /// True while the last record still expects continuation fragments.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// At least one record carries payload bytes.
    pub fn has_content(&self) -> bool {
        self.records.iter().any(|r| r.length > 0)
    }

    /// Start a new record at `offset`; it becomes the open record.
    pub fn open_record(&mut self, offset: usize) -> Result<()> {
        if self.records.len() >= self.max {
            return Err(DepayError::TooManyObus { max: self.max });
        }
        if self.records.len() == self.records.capacity() {
            self.records
                .try_reserve_exact(GROWTH_STEP)
                .map_err(|_| DepayError::OutOfMemory)?;
        }
        self.records.push(ObuRecord { offset, length: 0 });
        self.open = true;
        Ok(())
    }

    /// Grow the open record by `delta` payload bytes.
    pub fn extend_current(&mut self, delta: usize) {
        if let Some(last) = self.records.last_mut() {
            last.length += delta;
        }
    }

    /// Payload length of the open record, if any.
    pub fn current_length(&self) -> Option<usize> {
        if self.open {
            self.records.last().map(|r| r.length)
        } else {
            None
        }
    }

    /// Stop accepting continuation fragments for the last record.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Write each record's final length into its reserved size field.
    ///
    /// The field sits right after the OBU header, or after the extension
    /// byte when the header's extension flag is set.
    pub fn finalize_all(&self, buffer: &mut FrameBuffer) {
        for record in &self.records {
            let Some(header) = buffer.get(record.offset) else {
                continue;
            };
            let skip = if header & OBU_EXTENSION_FLAG != 0 { 2 } else { 1 };

            let mut field = [0u8; SIZE_FIELD_LEN];
            let fits = leb128::encode_padded(record.length as u64, &mut field);
            debug_assert!(fits, "record length checked on append");
            buffer.write_at(record.offset + skip, &field);
        }
    }

    /// Drop all records, keeping the allocation.
    pub fn clear(&mut self) {
        self.records.clear();
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_is_enforced() {
        let mut table = ObuTable::new(MAX_OBUS);
        for i in 0..MAX_OBUS {
            table.open_record(i).unwrap();
        }
        let err = table.open_record(MAX_OBUS).unwrap_err();
        assert!(matches!(err, DepayError::TooManyObus { max: 255 }));
        assert_eq!(table.len(), MAX_OBUS);
    }

    #[test]
    fn configured_cap_never_exceeds_protocol_max() {
        let table = ObuTable::new(1000);
        assert_eq!(table.max, MAX_OBUS);
    }

    #[test]
    fn extend_and_close() {
        let mut table = ObuTable::new(MAX_OBUS);
        assert_eq!(table.current_length(), None);

        table.open_record(0).unwrap();
        table.extend_current(10);
        table.extend_current(5);
        assert_eq!(table.current_length(), Some(15));
        assert!(table.has_content());

        table.close();
        assert!(!table.is_open());
        assert_eq!(table.current_length(), None);
        assert_eq!(table.records()[0], ObuRecord { offset: 0, length: 15 });
    }

    #[test]
    fn finalize_writes_size_after_header_and_extension() {
        let mut buf = FrameBuffer::new(1024);
        // Frame OBU without extension: header, 3-byte field, 2 payload bytes.
        buf.append(&[0x32, 0, 0, 0, 0xAA, 0xBB]).unwrap();
        // Frame OBU with extension: header, ext, 3-byte field, 1 payload byte.
        buf.append(&[0x36, 0x28, 0, 0, 0, 0xCC]).unwrap();

        let mut table = ObuTable::new(MAX_OBUS);
        table.open_record(0).unwrap();
        table.extend_current(2);
        table.open_record(6).unwrap();
        table.extend_current(1);
        table.finalize_all(&mut buf);

        assert_eq!(
            buf.as_slice(),
            &[0x32, 0x82, 0x80, 0x00, 0xAA, 0xBB, 0x36, 0x28, 0x81, 0x80, 0x00, 0xCC]
        );
    }

    #[test]
    fn clear_resets_open_state() {
        let mut table = ObuTable::new(MAX_OBUS);
        table.open_record(0).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert!(!table.is_open());
        assert!(!table.has_content());
    }
}
