//! Device Context - per-device state
//!
//! A context is what the registry maps a device number to. It owns the
//! device's buffer store behind one lock; every read and write holds that
//! lock for the duration of its copy, so transfers on one device are
//! serialized and never interleave.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use pseudo_chrdev::{DeviceNumber, FileOperations};
use spin::Mutex;

use crate::buffer::BufferStore;
use crate::session::Session;
use crate::DriverError;

pub struct DeviceContext {
    number: DeviceNumber,
    name: String,
    capacity: usize,
    store: Mutex<BufferStore>,
    next_session: AtomicU64,
    open_sessions: AtomicUsize,
}

impl DeviceContext {
    pub(crate) fn new(number: DeviceNumber, name: String, store: BufferStore) -> Self {
        Self {
            number,
            name,
            capacity: store.capacity(),
            store: Mutex::new(store),
            next_session: AtomicU64::new(1),
            open_sessions: AtomicUsize::new(0),
        }
    }

    /// Device number the context is registered under
    pub fn number(&self) -> DeviceNumber {
        self.number
    }

    /// Published node name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions opened and not yet released
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::Acquire)
    }

    /// Copy of the whole store, taken under the lock
    pub fn snapshot(&self) -> Vec<u8> {
        self.store.lock().as_slice().to_vec()
    }

    pub(crate) fn with_store<R>(&self, f: impl FnOnce(&BufferStore) -> R) -> R {
        f(&self.store.lock())
    }

    pub(crate) fn with_store_mut<R>(&self, f: impl FnOnce(&mut BufferStore) -> R) -> R {
        f(&mut self.store.lock())
    }

    pub(crate) fn session_opened(&self) -> u64 {
        self.open_sessions.fetch_add(1, Ordering::AcqRel);
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn session_closed(&self) {
        self.open_sessions.fetch_sub(1, Ordering::AcqRel);
    }
}

impl core::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("number", &self.number)
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}

impl FileOperations for DeviceContext {
    type File = Session;
    type Error = DriverError;

    fn open(ops: &Arc<Self>) -> Result<Session, DriverError> {
        Ok(Session::open(ops))
    }
}
