//! Pseudo Driver - RAM-backed character device
//!
//! # Purpose
//! Emulates a character-addressable storage device whose content lives in a
//! fixed-size in-memory buffer. Callers open the device, read and write at an
//! explicit offset, and release their handle.
//!
//! # Integration Points
//! - Depends on: Registration surface (`pseudo-chrdev`)
//! - Provides to: Anything holding a device number (CLI, tests, other components)
//! - IPC endpoints: None; calls arrive through the registry's `open`
//! - Capabilities required: Heap memory for the buffer stores
//!
//! # Architecture
//! - [`PseudoDriver`] owns the module state: identity block, device contexts,
//!   registrations and published names, with explicit init/teardown
//! - [`DeviceContext`] owns one [`BufferStore`] behind its own lock and is
//!   the operation table registered for its device number
//! - [`Session`] is one open handle; it keeps its context alive until released
//! - The I/O path copies through a transfer buffer so that a faulting caller
//!   buffer never leaves the store half-written
//!
//! # Testing Strategy
//! - Unit tests: Offset clamping, parameter validation, session state
//! - Integration tests: Lifecycle rollback, concurrent sessions, end-to-end scenarios
//! - Property tests: Transfer lengths and write/read round trips

mod buffer;
mod config;
mod device;
mod error;
mod io;
mod lifecycle;
mod session;

pub use buffer::{BufferStore, DEFAULT_CAPACITY};
pub use config::{DriverParams, MAX_DEVICES};
pub use device::DeviceContext;
pub use error::DriverError;
pub use lifecycle::PseudoDriver;
pub use session::Session;

pub use pseudo_chrdev::{
    CharDevRegistry, DeviceNumber, FileOperations, IdentityRange, OpenFile, RegistrationSurface,
    UserRegion, UserSliceReader, UserSliceWriter,
};

pub type Result<T> = core::result::Result<T, DriverError>;

/// Registry type the driver plugs into when hosted in-process
pub type Registry = CharDevRegistry<DeviceContext>;
