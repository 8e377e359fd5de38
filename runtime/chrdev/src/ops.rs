//! Operation table contract between the registry and a character driver

use std::sync::Arc;

use crate::uaccess::{UserSliceReader, UserSliceWriter};
use crate::RegistryError;

/// Per-device operation table
///
/// The registry stores one `Arc<Self>` per registered device number and
/// calls [`open`](Self::open) when a caller opens that number.
pub trait FileOperations: Send + Sync + 'static {
    /// Per-open state handed back to the caller
    type File: OpenFile<Error = Self::Error>;

    /// Driver error type; must absorb registry lookup failures
    type Error: From<RegistryError>;

    /// Bind a new open handle to the device behind `ops`
    fn open(ops: &Arc<Self>) -> Result<Self::File, Self::Error>;
}

/// Operations on one open handle
///
/// `pos` is the caller's file position. Implementations advance it by the
/// number of bytes transferred and leave it untouched on error.
pub trait OpenFile: Send + Sync {
    type Error;

    /// Fill `buf` from the device starting at `*pos`
    fn read<W: UserSliceWriter + ?Sized>(
        &self,
        pos: &mut u64,
        buf: &mut W,
    ) -> Result<usize, Self::Error>;

    /// Store `buf` into the device starting at `*pos`
    fn write<R: UserSliceReader + ?Sized>(
        &self,
        pos: &mut u64,
        buf: &R,
    ) -> Result<usize, Self::Error>;

    /// Close the handle
    fn release(&self) -> Result<(), Self::Error>;
}
