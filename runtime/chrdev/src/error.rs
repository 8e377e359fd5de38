use core::fmt;

use thiserror::Error;

use crate::errno;
use crate::number::{DeviceNumber, IdentityRange};

/// Registration surface calls that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AllocateIdentityBlock,
    RegisterDevice,
    PublishName,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::AllocateIdentityBlock => "allocate_identity_block",
            Operation::RegisterDevice => "register_device",
            Operation::PublishName => "publish_name",
        };
        f.write_str(name)
    }
}

/// Registration surface error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Invalid identity count {count} (must be 1..={max})")]
    InvalidCount { count: u32, max: u32 },

    #[error("No free dynamic major numbers")]
    MajorsExhausted,

    #[error("Identity range {range} is not allocated")]
    RangeNotAllocated { range: IdentityRange },

    #[error("Identity range {range} still has {registered} registered devices")]
    RangeBusy { range: IdentityRange, registered: usize },

    #[error("Device {number} lies outside every allocated identity block")]
    NumberNotAllocated { number: DeviceNumber },

    #[error("Device {number} is already registered")]
    AlreadyRegistered { number: DeviceNumber },

    #[error("No such device: {number}")]
    NoSuchDevice { number: DeviceNumber },

    #[error("Invalid device name: {name:?}")]
    InvalidName { name: String },

    #[error("Name already published: {name}")]
    NameInUse { name: String },

    #[error("Device {number} is already published as {name}")]
    AlreadyNamed { number: DeviceNumber, name: String },

    #[error("Device {number} has no published name")]
    NameNotPublished { number: DeviceNumber },

    #[error("Injected failure in {0}")]
    Injected(Operation),
}

impl RegistryError {
    /// Positive errno the kernel would report for this failure
    pub fn errno(&self) -> i32 {
        match self {
            RegistryError::InvalidCount { .. } | RegistryError::InvalidName { .. } => errno::EINVAL,
            RegistryError::NumberNotAllocated { .. } | RegistryError::NoSuchDevice { .. } => {
                errno::ENXIO
            }
            RegistryError::NameInUse { .. }
            | RegistryError::AlreadyNamed { .. }
            | RegistryError::AlreadyRegistered { .. } => errno::EEXIST,
            RegistryError::MajorsExhausted
            | RegistryError::RangeNotAllocated { .. }
            | RegistryError::RangeBusy { .. }
            | RegistryError::NameNotPublished { .. }
            | RegistryError::Injected(_) => errno::EBUSY,
        }
    }
}
