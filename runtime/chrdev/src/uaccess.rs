//! Caller-side memory access
//!
//! A driver never touches caller memory directly. Reads hand their bytes to a
//! [`UserSliceWriter`], writes pull theirs from a [`UserSliceReader`]; either
//! side may refuse with a [`Fault`], the equivalent of `copy_to_user` /
//! `copy_from_user` returning a non-zero count.

use thiserror::Error;

/// The caller's buffer could not be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Bad address: {len} bytes at user offset {offset}")]
pub struct Fault {
    /// First inaccessible byte
    pub offset: usize,
    /// Length of the rejected access
    pub len: usize,
}

/// Destination of a device read
pub trait UserSliceWriter {
    /// Bytes the caller asked for
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `data` to the start of the caller's buffer
    fn write_slice(&mut self, data: &[u8]) -> Result<(), Fault>;
}

/// Source of a device write
pub trait UserSliceReader {
    /// Bytes the caller offered
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `out` from the start of the caller's buffer
    fn read_slice(&self, out: &mut [u8]) -> Result<(), Fault>;
}

fn check_access(limit: usize, len: usize) -> Result<(), Fault> {
    if len > limit {
        return Err(Fault {
            offset: limit,
            len: len - limit,
        });
    }
    Ok(())
}

impl UserSliceWriter for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn write_slice(&mut self, data: &[u8]) -> Result<(), Fault> {
        check_access(<[u8]>::len(self), data.len())?;
        self[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl UserSliceReader for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn read_slice(&self, out: &mut [u8]) -> Result<(), Fault> {
        check_access(<[u8]>::len(self), out.len())?;
        out.copy_from_slice(&self[..out.len()]);
        Ok(())
    }
}

/// Caller buffer of which only a prefix is mapped
///
/// Accesses that stay inside the mapped prefix succeed; anything reaching
/// past it faults without copying a byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRegion {
    bytes: Vec<u8>,
    mapped: usize,
}

impl UserRegion {
    /// Zeroed, fully mapped region of `len` bytes
    pub fn new(len: usize) -> Self {
        Self::from_bytes(vec![0; len])
    }

    /// Fully mapped region holding `bytes`
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mapped = bytes.len();
        Self { bytes, mapped }
    }

    /// Restrict the accessible prefix to `mapped` bytes
    pub fn with_mapped(mut self, mapped: usize) -> Self {
        self.mapped = mapped.min(self.bytes.len());
        self
    }

    pub fn mapped(&self) -> usize {
        self.mapped
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl UserSliceWriter for UserRegion {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn write_slice(&mut self, data: &[u8]) -> Result<(), Fault> {
        check_access(self.mapped, data.len())?;
        self.bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl UserSliceReader for UserRegion {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read_slice(&self, out: &mut [u8]) -> Result<(), Fault> {
        check_access(self.mapped, out.len())?;
        out.copy_from_slice(&self.bytes[..out.len()]);
        Ok(())
    }
}
