//! Device numbers and identity blocks
//!
//! A device number packs a 12-bit major and a 20-bit minor into 32 bits,
//! the same split the Linux kernel uses for `dev_t`.

use core::fmt;

/// Number of bits reserved for the minor part
pub const MINOR_BITS: u32 = 20;

/// Mask selecting the minor part
pub const MINOR_MASK: u32 = (1 << MINOR_BITS) - 1;

const MAJOR_MASK: u32 = (1 << (32 - MINOR_BITS)) - 1;

/// Device identity (`major:minor`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceNumber(u32);

impl DeviceNumber {
    /// Pack a major and minor; out-of-range bits are masked off
    pub const fn new(major: u32, minor: u32) -> Self {
        Self(((major & MAJOR_MASK) << MINOR_BITS) | (minor & MINOR_MASK))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 >> MINOR_BITS
    }

    pub const fn minor(self) -> u32 {
        self.0 & MINOR_MASK
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}

/// Block of consecutive device numbers sharing one major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityRange {
    first: DeviceNumber,
    count: u32,
}

impl IdentityRange {
    pub(crate) fn new(first: DeviceNumber, count: u32) -> Self {
        debug_assert!(count > 0);
        debug_assert!(first.minor() as u64 + count as u64 <= MINOR_MASK as u64 + 1);
        Self { first, count }
    }

    /// First number of the block
    pub fn first(&self) -> DeviceNumber {
        self.first
    }

    /// Number of identities in the block
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn major(&self) -> u32 {
        self.first.major()
    }

    /// The `index`-th number of the block, if the block is that large
    pub fn get(&self, index: u32) -> Option<DeviceNumber> {
        (index < self.count).then(|| DeviceNumber::new(self.major(), self.first.minor() + index))
    }

    pub fn contains(&self, number: DeviceNumber) -> bool {
        number.major() == self.major()
            && number.minor() >= self.first.minor()
            && number.minor() - self.first.minor() < self.count
    }

    /// All numbers of the block in ascending order
    pub fn iter(&self) -> impl Iterator<Item = DeviceNumber> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}

impl fmt::Display for IdentityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.first.minor();
        write!(f, "{}:{}..{}", self.major(), first, first + self.count)
    }
}
