use crate::error::{DepayError, Result};

/// Minimum number of bytes added whenever the buffer grows.
const MIN_GROWTH: usize = 16_000;

/// Contiguous storage for the temporal unit being assembled.
///
/// Growth is geometric (at least +25% or +16000 bytes, whichever is larger)
/// and bounded by `max_len`. [`reset`](Self::reset) truncates without
/// releasing capacity, so steady-state streams stop allocating after the
/// first few frames.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    max_len: usize,
}

impl FrameBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            data: Vec::new(),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Make room for `additional` more bytes.
    ///
    /// Fails with [`DepayError::BufferTooLarge`] when the result would exceed
    /// the configured maximum and with [`DepayError::OutOfMemory`] when the
    /// allocator refuses. Content is untouched on failure.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .data
            .len()
            .checked_add(additional)
            .ok_or(DepayError::BufferTooLarge {
                requested: usize::MAX,
                max: self.max_len,
            })?;
        if needed > self.max_len {
            return Err(DepayError::BufferTooLarge {
                requested: needed,
                max: self.max_len,
            });
        }
        if needed <= self.data.capacity() {
            return Ok(());
        }

        let target = needed
            .saturating_add((needed / 4).max(MIN_GROWTH))
            .min(self.max_len);
        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|_| DepayError::OutOfMemory)?;

        tracing::trace!(
            capacity = self.data.capacity(),
            len = self.data.len(),
            "frame buffer grown"
        );
        Ok(())
    }

    /// Append `bytes` at the end, growing as needed. Nothing is written on
    /// failure.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Overwrite already-appended bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not within the current length.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn get(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Logically truncate to zero length, keeping the allocation.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Zero the whole allocation, including bytes past the logical length.
    #[cfg(debug_assertions)]
    pub fn scrub(&mut self) {
        let capacity = self.data.capacity();
        self.data.clear();
        self.data.resize(capacity, 0);
        self.data.clear();
    }
}
