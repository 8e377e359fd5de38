//! Buffer Store - the device's addressable content

use core::ops::Range;

use crate::{DriverError, Result};

/// Default device size (1MB)
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Clamp a transfer of `len` bytes at `offset` to a store of `capacity` bytes
pub(crate) fn clamp_span(capacity: usize, offset: u64, len: usize) -> Option<Range<usize>> {
    if offset >= capacity as u64 {
        return None;
    }
    let start = offset as usize;
    let n = len.min(capacity - start);
    Some(start..start + n)
}

/// Fixed-capacity byte array backing one device
///
/// Zero-filled at allocation. The capacity never changes afterwards.
pub struct BufferStore {
    bytes: Box<[u8]>,
}

impl BufferStore {
    /// Allocate a zeroed store of `capacity` bytes
    ///
    /// # Errors
    /// `InvalidParameter` for a zero capacity, `Allocation` when the memory
    /// cannot be obtained.
    pub fn allocate(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DriverError::InvalidParameter {
                name: "capacity",
                reason: "must be positive".to_string(),
            });
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| DriverError::Allocation {
                what: "buffer store",
                requested: capacity,
            })?;
        bytes.resize(capacity, 0);

        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Byte range a transfer of `len` bytes at `offset` may touch
    ///
    /// `None` when `offset` is at or past the end of the store; otherwise the
    /// range starts at `offset` and holds `min(len, capacity - offset)` bytes.
    pub fn span(&self, offset: u64, len: usize) -> Option<Range<usize>> {
        clamp_span(self.capacity(), offset, len)
    }

    /// Copy `out.len()` bytes starting at `offset` into `out`
    ///
    /// # Panics
    /// If the range leaves the store; callers clamp with [`span`](Self::span).
    pub fn read_at(&self, offset: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.bytes[offset..offset + out.len()]);
    }

    /// Copy `data` into the store starting at `offset`
    ///
    /// # Panics
    /// If the range leaves the store; callers clamp with [`span`](Self::span).
    pub fn write_at(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}
