//! Dynamic major allocation
//!
//! Majors are handed out from the top of the dynamic range downwards, like
//! `alloc_chrdev_region` does when asked for major 0.

use crate::{RegistryError, Result};

/// Highest dynamically assigned major
pub const DYNAMIC_MAJOR_FIRST: u32 = 254;

/// Lowest dynamically assigned major
pub const DYNAMIC_MAJOR_LAST: u32 = 234;

/// Major number allocator
pub(crate) struct MajorAllocator {
    /// Next never-used major
    next: u32,
    /// Lowest major we may hand out
    floor: u32,
    /// Majors returned by released blocks
    free: Vec<u32>,
}

impl MajorAllocator {
    pub(crate) fn new() -> Self {
        Self::with_range(DYNAMIC_MAJOR_FIRST, DYNAMIC_MAJOR_LAST)
    }

    pub(crate) fn with_range(first: u32, last: u32) -> Self {
        debug_assert!(first >= last);
        Self {
            next: first,
            floor: last,
            free: Vec::new(),
        }
    }

    pub(crate) fn allocate(&mut self) -> Result<u32> {
        // Prefer the highest released major, matching the kernel's top-down scan
        if let Some((idx, _)) = self.free.iter().enumerate().max_by_key(|(_, m)| **m) {
            return Ok(self.free.swap_remove(idx));
        }

        if self.next < self.floor {
            return Err(RegistryError::MajorsExhausted);
        }

        let major = self.next;
        self.next -= 1;
        Ok(major)
    }

    pub(crate) fn free(&mut self, major: u32) {
        debug_assert!(!self.free.contains(&major));
        self.free.push(major);
    }
}
