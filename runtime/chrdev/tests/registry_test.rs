//! Integration tests for the registry as a shared, multi-threaded surface

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pseudo_chrdev::*;

/// Operation table that echoes writes back on read
#[derive(Default)]
struct EchoDevice {
    opens: AtomicUsize,
}

struct EchoFile {
    last: spin::Mutex<Vec<u8>>,
}

impl OpenFile for EchoFile {
    type Error = RegistryError;

    fn read<W: UserSliceWriter + ?Sized>(&self, pos: &mut u64, buf: &mut W) -> Result<usize> {
        let last = self.last.lock();
        let n = last.len().min(buf.len());
        buf.write_slice(&last[..n])
            .map_err(|_| RegistryError::InvalidName { name: "fault".into() })?;
        *pos += n as u64;
        Ok(n)
    }

    fn write<R: UserSliceReader + ?Sized>(&self, pos: &mut u64, buf: &R) -> Result<usize> {
        let mut data = vec![0; buf.len()];
        buf.read_slice(&mut data)
            .map_err(|_| RegistryError::InvalidName { name: "fault".into() })?;
        *pos += data.len() as u64;
        let n = data.len();
        *self.last.lock() = data;
        Ok(n)
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }
}

impl FileOperations for EchoDevice {
    type File = EchoFile;
    type Error = RegistryError;

    fn open(ops: &Arc<Self>) -> Result<EchoFile> {
        ops.opens.fetch_add(1, Ordering::Relaxed);
        Ok(EchoFile {
            last: spin::Mutex::new(Vec::new()),
        })
    }
}

#[test]
fn test_full_registration_round_trip() {
    let registry = CharDevRegistry::<EchoDevice>::new();
    let range = registry.allocate_identity_block(2, "echo").unwrap();
    let device = Arc::new(EchoDevice::default());

    for (i, number) in range.iter().enumerate() {
        registry.register_device(number, device.clone()).unwrap();
        registry.publish_name(number, &format!("echo{}", i)).unwrap();
    }

    let number = registry.find_by_name("echo1").unwrap();
    assert_eq!(number, range.get(1).unwrap());

    let file = registry.open(number).unwrap();
    let mut pos = 0;
    assert_eq!(file.write(&mut pos, &b"ping"[..]).unwrap(), 4);
    let mut out = UserRegion::new(8);
    assert_eq!(file.read(&mut pos, &mut out).unwrap(), 4);
    assert_eq!(&out.as_bytes()[..4], b"ping");
    assert_eq!(pos, 8);
    file.release().unwrap();

    for number in range.iter() {
        registry.unpublish_name(number).unwrap();
        let ops = registry.unregister_device(number).unwrap();
        assert!(Arc::ptr_eq(&ops, &device));
    }
    registry.release_identity_block(range).unwrap();

    assert_eq!(registry.registered_count(), 0);
    assert_eq!(registry.allocated_blocks(), 0);
    assert!(registry.open(number).is_err());
}

#[test]
fn test_concurrent_opens() {
    let registry = CharDevRegistry::<EchoDevice>::new();
    let range = registry.allocate_identity_block(1, "echo").unwrap();
    let device = Arc::new(EchoDevice::default());
    registry.register_device(range.first(), device.clone()).unwrap();

    crossbeam::thread::scope(|s| {
        for _ in 0..8 {
            let registry = &registry;
            s.spawn(move |_| {
                for _ in 0..200 {
                    let file = registry.open(range.first()).unwrap();
                    file.release().unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(device.opens.load(Ordering::Relaxed), 8 * 200);
}

#[test]
fn test_errno_values() {
    let number = DeviceNumber::new(254, 0);
    assert_eq!(RegistryError::NoSuchDevice { number }.errno(), errno::ENXIO);
    assert_eq!(RegistryError::MajorsExhausted.errno(), errno::EBUSY);
    assert_eq!(
        RegistryError::NameInUse {
            name: "x".into()
        }
        .errno(),
        errno::EEXIST
    );
}
