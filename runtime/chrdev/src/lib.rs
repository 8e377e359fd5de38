//! Character Device Registration Surface
//!
//! # Purpose
//! Stands in for the kernel side of a character driver: hands out device
//! numbers, keeps the map from device number to the driver's operation table,
//! publishes node names and dispatches `open` into the registered driver.
//!
//! # Integration Points
//! - Depends on: nothing outside this crate
//! - Provides to: Character drivers (registration), callers (open/read/write)
//! - Capabilities required: None
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Caller (fd holder, CLI)          │
//! └──────────────┬──────────────────────────┘
//!                │ open(number) / read / write / release
//! ┌──────────────▼──────────────────────────┐
//! │   CharDevRegistry (this crate)          │
//! │  • Major allocator                      │
//! │  • Identity blocks                      │
//! │  • number → operation table map         │
//! │  • Published names                      │
//! └──────────────┬──────────────────────────┘
//!                │ FileOperations / OpenFile
//! ┌──────────────▼──────────────────────────┐
//! │           Character driver              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Testing Strategy
//! - Unit tests: Number packing, major allocation, user-memory faults
//! - Integration tests: Register/open/unregister round trips, failure injection

pub mod errno;
mod error;
mod number;
mod ops;
mod region;
mod registry;
pub mod uaccess;

pub use error::{Operation, RegistryError};
pub use number::{DeviceNumber, IdentityRange, MINOR_BITS, MINOR_MASK};
pub use ops::{FileOperations, OpenFile};
pub use region::{DYNAMIC_MAJOR_FIRST, DYNAMIC_MAJOR_LAST};
pub use registry::CharDevRegistry;
pub use uaccess::{Fault, UserRegion, UserSliceReader, UserSliceWriter};

use std::sync::Arc;

pub type Result<T> = core::result::Result<T, RegistryError>;

/// The calls a character driver makes into its host at load and unload time
///
/// Mirrors the `alloc_chrdev_region` / `cdev_add` / `device_create` family:
/// a driver reserves a block of identities, registers an operation table
/// under each identity it serves, and optionally publishes a node name.
/// Every acquiring call has a matching release call.
pub trait RegistrationSurface<F: FileOperations> {
    /// Reserve `count` consecutive device numbers under a fresh major
    ///
    /// # Errors
    /// `InvalidCount` when `count` is zero or exceeds the minor space,
    /// `MajorsExhausted` when no dynamic major is free.
    fn allocate_identity_block(&self, count: u32, name: &str) -> Result<IdentityRange>;

    /// Return a block obtained from [`allocate_identity_block`](Self::allocate_identity_block)
    fn release_identity_block(&self, range: IdentityRange) -> Result<()>;

    /// Route calls for `number` to `ops`
    fn register_device(&self, number: DeviceNumber, ops: Arc<F>) -> Result<()>;

    /// Stop routing calls for `number`, handing back the operation table
    fn unregister_device(&self, number: DeviceNumber) -> Result<Arc<F>>;

    /// Attach a human-readable node name to `number`
    fn publish_name(&self, number: DeviceNumber, name: &str) -> Result<()>;

    /// Remove the node name attached to `number`
    fn unpublish_name(&self, number: DeviceNumber) -> Result<()>;
}
