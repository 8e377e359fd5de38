use pseudo_chrdev::{errno, Fault, RegistryError};
use thiserror::Error;

/// Driver error types
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Allocation failed for {what} ({requested} bytes)")]
    Allocation { what: &'static str, requested: usize },

    #[error("Registration failed: {0}")]
    Registration(#[from] RegistryError),

    #[error("Cannot allocate transfer buffer ({requested} bytes)")]
    OutOfMemory { requested: usize },

    #[error("Cannot transfer data to or from caller: {0}")]
    TransferFault(#[from] Fault),

    #[error("No space left on device (offset {offset}, capacity {capacity})")]
    NoSpace { offset: u64, capacity: usize },

    #[error("Session {session} already released")]
    SessionReleased { session: u64 },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Cannot parse parameters: {0}")]
    Params(#[from] toml::de::Error),
}

impl DriverError {
    /// Negative errno as a file operation would return it
    pub fn to_errno(&self) -> i32 {
        let code = match self {
            DriverError::Allocation { .. } | DriverError::OutOfMemory { .. } => errno::ENOMEM,
            DriverError::Registration(err) => err.errno(),
            DriverError::TransferFault(_) => errno::EFAULT,
            DriverError::NoSpace { .. } => errno::ENOSPC,
            DriverError::SessionReleased { .. } => errno::EBADF,
            DriverError::InvalidParameter { .. } | DriverError::Params(_) => errno::EINVAL,
        };
        -code
    }
}
