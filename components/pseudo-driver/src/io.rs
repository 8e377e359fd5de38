//! I/O Path - bounded transfers between callers and a buffer store
//!
//! Both directions stage data in a transfer buffer. Reads copy out of the
//! store under the device lock and hand the copy to the caller afterwards;
//! writes pull the caller's bytes first and only then commit under the lock.
//! A caller fault therefore never leaves the store partially updated and
//! never advances the file position.

use pseudo_chrdev::{UserSliceReader, UserSliceWriter};

use crate::buffer::clamp_span;
use crate::device::DeviceContext;
use crate::{DriverError, Result};

fn transfer_buffer(len: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| DriverError::OutOfMemory { requested: len })?;
    data.resize(len, 0);
    Ok(data)
}

/// Read up to `buf.len()` bytes at `*pos`
///
/// Returns 0 at or past the end of the device.
pub(crate) fn read<W: UserSliceWriter + ?Sized>(
    context: &DeviceContext,
    pos: &mut u64,
    buf: &mut W,
) -> Result<usize> {
    let offset = *pos;
    let Some(span) = clamp_span(context.capacity(), offset, buf.len()) else {
        return Ok(0);
    };

    let mut data = transfer_buffer(span.len())?;
    context.with_store(|store| store.read_at(span.start, &mut data));

    log::debug!(
        "pseudo_driver: read {} bytes from device {}, offset {}",
        data.len(),
        context.number(),
        offset
    );

    if let Err(fault) = buf.write_slice(&data) {
        log::error!("pseudo_driver: cannot write data: {}", fault);
        return Err(fault.into());
    }

    *pos = span.end as u64;
    Ok(data.len())
}

/// Write up to `buf.len()` bytes at `*pos`
///
/// # Errors
/// `NoSpace` at or past the end of the device.
pub(crate) fn write<R: UserSliceReader + ?Sized>(
    context: &DeviceContext,
    pos: &mut u64,
    buf: &R,
) -> Result<usize> {
    let offset = *pos;
    let Some(span) = clamp_span(context.capacity(), offset, buf.len()) else {
        return Err(DriverError::NoSpace {
            offset,
            capacity: context.capacity(),
        });
    };

    let mut data = transfer_buffer(span.len())?;
    if let Err(fault) = buf.read_slice(&mut data) {
        log::error!("pseudo_driver: cannot read data: {}", fault);
        return Err(fault.into());
    }

    log::debug!(
        "pseudo_driver: write {} bytes to device {}, offset {}",
        data.len(),
        context.number(),
        offset
    );

    context.with_store_mut(|store| store.write_at(span.start, &data));

    *pos = span.end as u64;
    Ok(data.len())
}
