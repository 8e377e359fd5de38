//! Lifecycle Manager - driver load and unload
//!
//! [`PseudoDriver`] is the single handle for everything the driver acquires
//! at load time. It records each acquisition as it happens, so [`shutdown`]
//! undoes exactly what was done: it runs both on a failed load (rolling back
//! a partial bring-up) and on a normal unload.
//!
//! [`shutdown`]: PseudoDriver::shutdown

use std::sync::Arc;

use pseudo_chrdev::{DeviceNumber, IdentityRange, RegistrationSurface};

use crate::buffer::BufferStore;
use crate::config::DriverParams;
use crate::device::DeviceContext;
use crate::Result;

/// Loaded driver instance
pub struct PseudoDriver<S: RegistrationSurface<DeviceContext>> {
    surface: Arc<S>,
    params: DriverParams,
    /// Identity block, once allocated
    range: Option<IdentityRange>,
    /// Contexts constructed so far, in device order
    devices: Vec<Arc<DeviceContext>>,
    /// Numbers successfully registered with the surface
    registered: Vec<DeviceNumber>,
    /// Numbers whose node name was published
    published: Vec<DeviceNumber>,
}

impl<S: RegistrationSurface<DeviceContext>> PseudoDriver<S> {
    /// Load the driver
    ///
    /// Allocates one buffer store per device, reserves `device_count`
    /// identities, then registers each device context and publishes its node
    /// name.
    ///
    /// # Errors
    /// `InvalidParameter` for bad parameters, `Allocation` when a buffer
    /// store cannot be allocated, `Registration` when the surface refuses
    /// an identity block, a registration or a name. Everything acquired
    /// before the failure is released before the error is returned.
    pub fn initialize(surface: Arc<S>, params: DriverParams) -> Result<Self> {
        params.validate()?;

        let mut driver = Self {
            surface,
            params,
            range: None,
            devices: Vec::new(),
            registered: Vec::new(),
            published: Vec::new(),
        };

        if let Err(err) = driver.bring_up() {
            log::error!("pseudo_driver: cannot load: {}", err);
            driver.shutdown();
            return Err(err);
        }

        log::info!(
            "pseudo_driver: loaded {} device(s) at {}, {} bytes each",
            driver.devices.len(),
            driver.range.map(|r| r.to_string()).unwrap_or_default(),
            driver.params.capacity
        );
        Ok(driver)
    }

    fn bring_up(&mut self) -> Result<()> {
        let count = self.params.device_count;

        let mut stores = Vec::with_capacity(count as usize);
        for _ in 0..count {
            stores.push(BufferStore::allocate(self.params.capacity)?);
        }

        let range = self
            .surface
            .allocate_identity_block(count, &self.params.region_name)?;
        self.range = Some(range);

        for (index, (number, store)) in range.iter().zip(stores).enumerate() {
            let context = Arc::new(DeviceContext::new(number, self.params.node_name(index), store));
            self.devices.push(Arc::clone(&context));

            self.surface.register_device(number, Arc::clone(&context))?;
            self.registered.push(number);

            self.surface.publish_name(number, context.name())?;
            self.published.push(number);
        }

        Ok(())
    }

    /// Unload the driver
    ///
    /// Unpublishes names, unregisters devices, releases the identity block
    /// and drops the buffer stores. Only the steps that apply are performed,
    /// so this is safe after a partial load and a no-op when repeated. An
    /// identity block the surface refuses to release is kept and retried by
    /// the next call.
    /// Sessions still open keep their own context alive until released.
    pub fn shutdown(&mut self) {
        if self.range.is_none() && self.devices.is_empty() {
            return;
        }

        for number in self.published.drain(..).rev() {
            if let Err(err) = self.surface.unpublish_name(number) {
                log::warn!("pseudo_driver: cannot unpublish {}: {}", number, err);
            }
        }

        for number in self.registered.drain(..).rev() {
            if let Err(err) = self.surface.unregister_device(number) {
                log::warn!("pseudo_driver: cannot unregister {}: {}", number, err);
            }
        }

        for context in self.devices.drain(..) {
            let open = context.open_sessions();
            if open > 0 {
                log::warn!(
                    "pseudo_driver: {} unloaded with {} open session(s)",
                    context.number(),
                    open
                );
            }
        }

        if let Some(range) = self.range {
            match self.surface.release_identity_block(range) {
                Ok(()) => self.range = None,
                Err(err) => log::warn!("pseudo_driver: cannot release {}: {}", range, err),
            }
        }

        log::info!("pseudo_driver: unloading");
    }

    /// Is the driver currently loaded?
    pub fn is_loaded(&self) -> bool {
        self.range.is_some()
    }

    pub fn params(&self) -> &DriverParams {
        &self.params
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    /// Identity block the devices live in
    pub fn range(&self) -> Option<IdentityRange> {
        self.range
    }

    /// Device contexts in device order
    pub fn devices(&self) -> &[Arc<DeviceContext>] {
        &self.devices
    }

    /// Context of the `index`-th device
    pub fn device(&self, index: usize) -> Option<&Arc<DeviceContext>> {
        self.devices.get(index)
    }

    /// Device numbers in device order
    pub fn numbers(&self) -> Vec<DeviceNumber> {
        self.devices.iter().map(|d| d.number()).collect()
    }
}

impl<S: RegistrationSurface<DeviceContext>> Drop for PseudoDriver<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DriverError, Registry};
    use core::sync::atomic::{AtomicBool, Ordering};
    use pseudo_chrdev::{Operation, RegistryError};

    /// Registry whose next identity block release is refused
    #[derive(Default)]
    struct StickyRegistry {
        inner: Registry,
        refuse_release: AtomicBool,
    }

    impl RegistrationSurface<DeviceContext> for StickyRegistry {
        fn allocate_identity_block(
            &self,
            count: u32,
            name: &str,
        ) -> pseudo_chrdev::Result<IdentityRange> {
            self.inner.allocate_identity_block(count, name)
        }

        fn release_identity_block(&self, range: IdentityRange) -> pseudo_chrdev::Result<()> {
            if self.refuse_release.swap(false, Ordering::AcqRel) {
                return Err(RegistryError::RangeBusy {
                    range,
                    registered: 0,
                });
            }
            self.inner.release_identity_block(range)
        }

        fn register_device(
            &self,
            number: DeviceNumber,
            ops: Arc<DeviceContext>,
        ) -> pseudo_chrdev::Result<()> {
            self.inner.register_device(number, ops)
        }

        fn unregister_device(
            &self,
            number: DeviceNumber,
        ) -> pseudo_chrdev::Result<Arc<DeviceContext>> {
            self.inner.unregister_device(number)
        }

        fn publish_name(&self, number: DeviceNumber, name: &str) -> pseudo_chrdev::Result<()> {
            self.inner.publish_name(number, name)
        }

        fn unpublish_name(&self, number: DeviceNumber) -> pseudo_chrdev::Result<()> {
            self.inner.unpublish_name(number)
        }
    }

    fn small_params(devices: u32) -> DriverParams {
        DriverParams::default()
            .with_device_count(devices)
            .with_capacity(64)
    }

    #[test]
    fn test_initialize_registers_every_device() {
        let registry = Arc::new(Registry::new());
        let driver = PseudoDriver::initialize(registry.clone(), small_params(3)).unwrap();

        assert!(driver.is_loaded());
        assert_eq!(driver.devices().len(), 3);
        assert_eq!(registry.registered_count(), 3);
        assert_eq!(registry.allocated_blocks(), 1);

        let numbers = driver.numbers();
        assert_eq!(numbers.len(), 3);
        for (i, number) in numbers.iter().enumerate() {
            assert_eq!(number.minor(), i as u32);
            assert_eq!(registry.name_of(*number), Some(format!("pseudo_dev{}", i)));
        }
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let mut driver = PseudoDriver::initialize(registry.clone(), small_params(1)).unwrap();

        driver.shutdown();
        assert!(!driver.is_loaded());
        assert_eq!(registry.registered_count(), 0);
        assert_eq!(registry.allocated_blocks(), 0);

        driver.shutdown();
        assert_eq!(registry.allocated_blocks(), 0);
    }

    #[test]
    fn test_drop_unloads() {
        let registry = Arc::new(Registry::new());
        {
            let _driver = PseudoDriver::initialize(registry.clone(), small_params(2)).unwrap();
            assert_eq!(registry.registered_count(), 2);
        }
        assert_eq!(registry.registered_count(), 0);
        assert_eq!(registry.allocated_blocks(), 0);
        assert_eq!(registry.find_by_name("pseudo_dev0"), None);
    }

    #[test]
    fn test_rollback_when_second_registration_fails() {
        let registry = Arc::new(Registry::new());
        registry.inject_failure_after(Operation::RegisterDevice, 1);
        let result = PseudoDriver::initialize(registry.clone(), small_params(2));
        assert!(matches!(
            result,
            Err(DriverError::Registration(RegistryError::Injected(
                Operation::RegisterDevice
            )))
        ));
        assert_eq!(registry.registered_count(), 0);
        assert_eq!(registry.allocated_blocks(), 0);
        assert_eq!(registry.find_by_name("pseudo_dev0"), None);
    }

    #[test]
    fn test_refused_release_retried_by_next_shutdown() {
        let surface = Arc::new(StickyRegistry::default());
        let mut driver = PseudoDriver::initialize(surface.clone(), small_params(1)).unwrap();
        let range = driver.range().unwrap();

        surface.refuse_release.store(true, Ordering::Release);
        driver.shutdown();
        assert!(driver.is_loaded());
        assert_eq!(driver.range(), Some(range));
        assert_eq!(surface.inner.registered_count(), 0);
        assert_eq!(surface.inner.allocated_blocks(), 1);

        driver.shutdown();
        assert!(!driver.is_loaded());
        assert_eq!(surface.inner.allocated_blocks(), 0);
    }

    #[test]
    fn test_invalid_params_touch_nothing() {
        let registry = Arc::new(Registry::new());
        let result = PseudoDriver::initialize(registry.clone(), small_params(0));
        assert!(matches!(result, Err(DriverError::InvalidParameter { .. })));
        assert_eq!(registry.allocated_blocks(), 0);
    }
}
