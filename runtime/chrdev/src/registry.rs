//! In-process registration surface
//!
//! Keeps the identity blocks handed out to drivers, the map from device
//! number to operation table, and the published node names. `open` resolves
//! a device number through that map, so a driver never has to recover its
//! per-device state from anything other than the table it registered.

use std::collections::BTreeMap;
use std::sync::Arc;

use spin::{Mutex, RwLock};

use crate::number::{DeviceNumber, IdentityRange, MINOR_MASK};
use crate::ops::FileOperations;
use crate::region::MajorAllocator;
use crate::{Operation, RegistrationSurface, RegistryError, Result};

/// Maximum length of an identity block or node name
const MAX_NAME_LEN: usize = 64;

/// An identity block and the name it was requested under
#[derive(Debug, Clone)]
struct RegionRecord {
    range: IdentityRange,
    name: String,
}

struct RegistryState<F> {
    majors: MajorAllocator,
    regions: Vec<RegionRecord>,
    devices: BTreeMap<DeviceNumber, Arc<F>>,
    names: BTreeMap<DeviceNumber, String>,
}

impl<F> RegistryState<F> {
    fn region_of(&self, number: DeviceNumber) -> Option<&RegionRecord> {
        self.regions.iter().find(|r| r.range.contains(number))
    }
}

/// Character device registry
///
/// Safe to share between threads; lookups take a read lock so concurrent
/// `open` calls do not serialize behind each other.
pub struct CharDevRegistry<F> {
    state: RwLock<RegistryState<F>>,
    /// One-shot failures armed by [`inject_failure_after`](Self::inject_failure_after),
    /// each with the number of calls still allowed to succeed first
    injected: Mutex<Vec<(Operation, u32)>>,
}

impl<F: FileOperations> CharDevRegistry<F> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                majors: MajorAllocator::new(),
                regions: Vec::new(),
                devices: BTreeMap::new(),
                names: BTreeMap::new(),
            }),
            injected: Mutex::new(Vec::new()),
        }
    }

    /// Make the next call of `operation` fail with [`RegistryError::Injected`]
    ///
    /// Each armed failure fires once. Used to exercise driver rollback.
    pub fn inject_failure(&self, operation: Operation) {
        self.inject_failure_after(operation, 0);
    }

    /// Let `successes` calls of `operation` through, then fail the next one
    pub fn inject_failure_after(&self, operation: Operation, successes: u32) {
        self.injected.lock().push((operation, successes));
    }

    fn take_injected(&self, operation: Operation) -> Result<()> {
        let mut injected = self.injected.lock();
        let Some(idx) = injected.iter().position(|(op, _)| *op == operation) else {
            return Ok(());
        };

        if injected[idx].1 > 0 {
            injected[idx].1 -= 1;
            return Ok(());
        }

        injected.remove(idx);
        log::debug!("chrdev: injected failure in {}", operation);
        Err(RegistryError::Injected(operation))
    }

    /// Open the device registered under `number`
    ///
    /// # Errors
    /// `NoSuchDevice` (converted into the driver's error) when nothing is
    /// registered under `number`; otherwise whatever the driver's `open`
    /// returns.
    pub fn open(&self, number: DeviceNumber) -> core::result::Result<F::File, F::Error> {
        let ops = self
            .state
            .read()
            .devices
            .get(&number)
            .cloned()
            .ok_or(RegistryError::NoSuchDevice { number })?;

        F::open(&ops)
    }

    /// Operation table registered under `number`
    pub fn lookup(&self, number: DeviceNumber) -> Option<Arc<F>> {
        self.state.read().devices.get(&number).cloned()
    }

    /// Is anything registered under `number`?
    pub fn is_registered(&self, number: DeviceNumber) -> bool {
        self.state.read().devices.contains_key(&number)
    }

    /// Number of registered devices
    pub fn registered_count(&self) -> usize {
        self.state.read().devices.len()
    }

    /// Number of identity blocks currently allocated
    pub fn allocated_blocks(&self) -> usize {
        self.state.read().regions.len()
    }

    /// Name published for `number`
    pub fn name_of(&self, number: DeviceNumber) -> Option<String> {
        self.state.read().names.get(&number).cloned()
    }

    /// Device number published under `name`
    pub fn find_by_name(&self, name: &str) -> Option<DeviceNumber> {
        self.state
            .read()
            .names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(number, _)| *number)
    }

    /// Identity blocks with the names they were requested under
    pub fn blocks(&self) -> Vec<(IdentityRange, String)> {
        self.state
            .read()
            .regions
            .iter()
            .map(|r| (r.range, r.name.clone()))
            .collect()
    }
}

impl<F: FileOperations> Default for CharDevRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('/') {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl<F: FileOperations> RegistrationSurface<F> for CharDevRegistry<F> {
    fn allocate_identity_block(&self, count: u32, name: &str) -> Result<IdentityRange> {
        self.take_injected(Operation::AllocateIdentityBlock)?;

        let max = MINOR_MASK + 1;
        if count == 0 || count > max {
            return Err(RegistryError::InvalidCount { count, max });
        }
        validate_name(name)?;

        let mut state = self.state.write();
        let major = state.majors.allocate()?;
        let range = IdentityRange::new(DeviceNumber::new(major, 0), count);
        state.regions.push(RegionRecord {
            range,
            name: name.to_string(),
        });

        log::debug!("chrdev: allocated {} for {}", range, name);
        Ok(range)
    }

    fn release_identity_block(&self, range: IdentityRange) -> Result<()> {
        let mut state = self.state.write();

        let idx = state
            .regions
            .iter()
            .position(|r| r.range == range)
            .ok_or(RegistryError::RangeNotAllocated { range })?;

        let registered = state.devices.keys().filter(|n| range.contains(**n)).count();
        if registered > 0 {
            return Err(RegistryError::RangeBusy { range, registered });
        }

        let record = state.regions.swap_remove(idx);
        state.majors.free(range.major());

        log::debug!("chrdev: released {} ({})", range, record.name);
        Ok(())
    }

    fn register_device(&self, number: DeviceNumber, ops: Arc<F>) -> Result<()> {
        self.take_injected(Operation::RegisterDevice)?;

        let mut state = self.state.write();
        if state.region_of(number).is_none() {
            return Err(RegistryError::NumberNotAllocated { number });
        }
        if state.devices.contains_key(&number) {
            return Err(RegistryError::AlreadyRegistered { number });
        }

        state.devices.insert(number, ops);
        log::debug!("chrdev: registered {}", number);
        Ok(())
    }

    fn unregister_device(&self, number: DeviceNumber) -> Result<Arc<F>> {
        let ops = self
            .state
            .write()
            .devices
            .remove(&number)
            .ok_or(RegistryError::NoSuchDevice { number })?;

        log::debug!("chrdev: unregistered {}", number);
        Ok(ops)
    }

    fn publish_name(&self, number: DeviceNumber, name: &str) -> Result<()> {
        self.take_injected(Operation::PublishName)?;
        validate_name(name)?;

        let mut state = self.state.write();
        if state.region_of(number).is_none() {
            return Err(RegistryError::NumberNotAllocated { number });
        }
        if let Some(existing) = state.names.get(&number) {
            return Err(RegistryError::AlreadyNamed {
                number,
                name: existing.clone(),
            });
        }
        if state.names.values().any(|n| n == name) {
            return Err(RegistryError::NameInUse {
                name: name.to_string(),
            });
        }

        state.names.insert(number, name.to_string());
        log::debug!("chrdev: published {} as {}", number, name);
        Ok(())
    }

    fn unpublish_name(&self, number: DeviceNumber) -> Result<()> {
        self.state
            .write()
            .names
            .remove(&number)
            .map(|_| ())
            .ok_or(RegistryError::NameNotPublished { number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpenFile;
    use crate::uaccess::{UserSliceReader, UserSliceWriter};

    /// Operation table that counts opens and transfers nothing
    #[derive(Default)]
    struct NullDevice {
        opens: Mutex<usize>,
    }

    struct NullFile;

    impl OpenFile for NullFile {
        type Error = RegistryError;

        fn read<W: UserSliceWriter + ?Sized>(
            &self,
            _pos: &mut u64,
            _buf: &mut W,
        ) -> Result<usize> {
            Ok(0)
        }

        fn write<R: UserSliceReader + ?Sized>(&self, _pos: &mut u64, buf: &R) -> Result<usize> {
            Ok(buf.len())
        }

        fn release(&self) -> Result<()> {
            Ok(())
        }
    }

    impl FileOperations for NullDevice {
        type File = NullFile;
        type Error = RegistryError;

        fn open(ops: &Arc<Self>) -> Result<NullFile> {
            *ops.opens.lock() += 1;
            Ok(NullFile)
        }
    }

    #[test]
    fn test_allocate_and_release_block() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let range = registry.allocate_identity_block(4, "null").unwrap();

        assert_eq!(range.major(), 254);
        assert_eq!(range.count(), 4);
        assert_eq!(registry.allocated_blocks(), 1);

        registry.release_identity_block(range).unwrap();
        assert_eq!(registry.allocated_blocks(), 0);

        let result = registry.release_identity_block(range);
        assert!(matches!(result, Err(RegistryError::RangeNotAllocated { .. })));
    }

    #[test]
    fn test_invalid_counts_rejected() {
        let registry = CharDevRegistry::<NullDevice>::new();
        assert!(matches!(
            registry.allocate_identity_block(0, "null"),
            Err(RegistryError::InvalidCount { count: 0, .. })
        ));
        assert!(matches!(
            registry.allocate_identity_block(MINOR_MASK + 2, "null"),
            Err(RegistryError::InvalidCount { .. })
        ));
    }

    #[test]
    fn test_register_requires_allocated_number() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let stray = DeviceNumber::new(200, 0);

        let result = registry.register_device(stray, Arc::new(NullDevice::default()));
        assert!(matches!(result, Err(RegistryError::NumberNotAllocated { .. })));
    }

    #[test]
    fn test_open_dispatches_to_registered_table() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let range = registry.allocate_identity_block(1, "null").unwrap();
        let dev = Arc::new(NullDevice::default());
        registry.register_device(range.first(), dev.clone()).unwrap();

        registry.open(range.first()).unwrap();
        registry.open(range.first()).unwrap();
        assert_eq!(*dev.opens.lock(), 2);

        let missing = DeviceNumber::new(range.major(), 1);
        assert!(matches!(
            registry.open(missing),
            Err(RegistryError::NoSuchDevice { .. })
        ));
    }

    #[test]
    fn test_double_register_rejected() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let range = registry.allocate_identity_block(1, "null").unwrap();
        registry
            .register_device(range.first(), Arc::new(NullDevice::default()))
            .unwrap();

        let result = registry.register_device(range.first(), Arc::new(NullDevice::default()));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered { .. })));
    }

    #[test]
    fn test_busy_block_cannot_be_released() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let range = registry.allocate_identity_block(2, "null").unwrap();
        registry
            .register_device(range.first(), Arc::new(NullDevice::default()))
            .unwrap();

        let result = registry.release_identity_block(range);
        assert!(matches!(
            result,
            Err(RegistryError::RangeBusy { registered: 1, .. })
        ));

        registry.unregister_device(range.first()).unwrap();
        registry.release_identity_block(range).unwrap();
    }

    #[test]
    fn test_names_are_unique() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let range = registry.allocate_identity_block(2, "null").unwrap();
        let first = range.first();
        let second = range.get(1).unwrap();

        registry.publish_name(first, "null0").unwrap();
        assert!(matches!(
            registry.publish_name(second, "null0"),
            Err(RegistryError::NameInUse { .. })
        ));
        assert_eq!(registry.find_by_name("null0"), Some(first));

        registry.unpublish_name(first).unwrap();
        assert!(matches!(
            registry.unpublish_name(first),
            Err(RegistryError::NameNotPublished { .. })
        ));
        assert!(matches!(
            registry.publish_name(second, "bad/name"),
            Err(RegistryError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_renaming_published_number_rejected() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let range = registry.allocate_identity_block(1, "null").unwrap();
        let first = range.first();

        registry.publish_name(first, "null0").unwrap();
        let result = registry.publish_name(first, "other0");
        assert_eq!(
            result,
            Err(RegistryError::AlreadyNamed {
                number: first,
                name: "null0".into()
            })
        );
        assert_eq!(result.unwrap_err().errno(), crate::errno::EEXIST);
        assert_eq!(registry.name_of(first), Some("null0".to_string()));
        assert_eq!(registry.find_by_name("other0"), None);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let registry = CharDevRegistry::<NullDevice>::new();
        registry.inject_failure(Operation::AllocateIdentityBlock);

        let result = registry.allocate_identity_block(1, "null");
        assert_eq!(
            result.unwrap_err(),
            RegistryError::Injected(Operation::AllocateIdentityBlock)
        );
        assert_eq!(registry.allocated_blocks(), 0);

        registry.allocate_identity_block(1, "null").unwrap();
    }

    #[test]
    fn test_injected_failure_after_successes() {
        let registry = CharDevRegistry::<NullDevice>::new();
        let range = registry.allocate_identity_block(3, "null").unwrap();
        registry.inject_failure_after(Operation::PublishName, 2);

        registry.publish_name(range.get(0).unwrap(), "null0").unwrap();
        registry.publish_name(range.get(1).unwrap(), "null1").unwrap();
        assert_eq!(
            registry.publish_name(range.get(2).unwrap(), "null2"),
            Err(RegistryError::Injected(Operation::PublishName))
        );
        registry.publish_name(range.get(2).unwrap(), "null2").unwrap();
    }
}
