//! Module parameters
//!
//! Read once at load time. Any field left out of a parameter file takes its
//! default, so an empty file describes one 1MB device.

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_CAPACITY;
use crate::{DriverError, Result};

/// Upper bound on `device_count`
pub const MAX_DEVICES: u32 = 16;

/// Driver load parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverParams {
    /// Number of devices (`ndevices`)
    pub device_count: u32,
    /// Size of each device's buffer store in bytes
    pub capacity: usize,
    /// Name the identity block is requested under
    pub region_name: String,
    /// Node names are `<node_prefix><index>`
    pub node_prefix: String,
}

impl Default for DriverParams {
    fn default() -> Self {
        Self {
            device_count: 1,
            capacity: DEFAULT_CAPACITY,
            region_name: "pseudo_driver".to_string(),
            node_prefix: "pseudo_dev".to_string(),
        }
    }
}

impl DriverParams {
    /// Parse and validate parameters from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let params: Self = toml::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn with_device_count(mut self, device_count: u32) -> Self {
        self.device_count = device_count;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Check every field
    ///
    /// # Errors
    /// `InvalidParameter` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.device_count == 0 || self.device_count > MAX_DEVICES {
            return Err(DriverError::InvalidParameter {
                name: "device_count",
                reason: format!("{} not in 1..={}", self.device_count, MAX_DEVICES),
            });
        }
        if self.capacity == 0 {
            return Err(DriverError::InvalidParameter {
                name: "capacity",
                reason: "must be positive".to_string(),
            });
        }
        if self.region_name.is_empty() {
            return Err(DriverError::InvalidParameter {
                name: "region_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.node_prefix.is_empty() || self.node_prefix.contains('/') {
            return Err(DriverError::InvalidParameter {
                name: "node_prefix",
                reason: format!("{:?} is not a valid node name", self.node_prefix),
            });
        }
        Ok(())
    }

    /// Node name of the `index`-th device
    pub fn node_name(&self, index: usize) -> String {
        format!("{}{}", self.node_prefix, index)
    }
}
