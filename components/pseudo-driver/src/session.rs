//! Session - one open handle on a device
//!
//! A session holds its device context by `Arc`, so the context (and its
//! buffer store) stays alive for as long as any session is open, even after
//! the driver has been unloaded.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pseudo_chrdev::{OpenFile, UserSliceReader, UserSliceWriter};

use crate::device::DeviceContext;
use crate::{io, DriverError, Result};

pub struct Session {
    id: u64,
    context: Arc<DeviceContext>,
    released: AtomicBool,
}

impl Session {
    /// Open a new handle on `context`; never fails
    pub fn open(context: &Arc<DeviceContext>) -> Self {
        let id = context.session_opened();
        log::trace!("pseudo_driver: opened device {} (session {})", context.number(), id);

        Self {
            id,
            context: Arc::clone(context),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Context the session was opened against
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_released() {
            return Err(DriverError::SessionReleased { session: self.id });
        }
        Ok(())
    }
}

impl OpenFile for Session {
    type Error = DriverError;

    fn read<W: UserSliceWriter + ?Sized>(&self, pos: &mut u64, buf: &mut W) -> Result<usize> {
        self.ensure_open()?;
        io::read(&self.context, pos, buf)
    }

    fn write<R: UserSliceReader + ?Sized>(&self, pos: &mut u64, buf: &R) -> Result<usize> {
        self.ensure_open()?;
        io::write(&self.context, pos, buf)
    }

    /// Close the handle
    ///
    /// # Errors
    /// `SessionReleased` if the handle was already released.
    fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(DriverError::SessionReleased { session: self.id });
        }
        self.context.session_closed();
        log::trace!("pseudo_driver: device {} closed (session {})", self.context.number(), self.id);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.context.session_closed();
        }
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("device", &self.context.number())
            .field("released", &self.is_released())
            .finish()
    }
}
