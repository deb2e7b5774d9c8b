//! Reference-counted device identity
//!
//! A [`UsbDevice`] holds one libusb reference to its device: taking it on
//! construction, giving it back on drop. Several values may name the same
//! device; `clone` takes another reference, so aliasing is always explicit.

use crate::descriptor::{ConfigDescriptor, DeviceDescriptor};
use crate::error::{ErrorCode, UsbError};
use crate::handle::DeviceHandle;
use crate::invoke::{CallPolicy, invoke};
use crate::native::{Libusb, Native, NativeApi, libusb_device, libusb_device_descriptor};
use crate::scoped::{Disposer, Scoped};
use std::ffi::c_int;
use std::fmt::Write;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use tracing::debug;

/// USB 3.0 allows at most 7 tiers below the root hub
pub const MAX_PORT_NUMBERS: usize = 7;

#[derive(Debug, Clone)]
pub struct DeviceUnref<B: NativeApi> {
    native: Native<B>,
}

impl<B: NativeApi> Disposer for DeviceUnref<B> {
    type Target = libusb_device;

    fn dispose(&mut self, raw: NonNull<libusb_device>) {
        // SAFETY: we hold one reference to `raw`, given back exactly once here.
        unsafe { self.native.backend().unref_device(raw.as_ptr()) };
    }
}

#[derive(Debug)]
pub struct UsbDevice<B: NativeApi = Libusb> {
    inner: Scoped<DeviceUnref<B>>,
}

// SAFETY: libusb device reference counts are atomic and the identity itself
// is immutable.
unsafe impl<B: NativeApi + Send> Send for UsbDevice<B> {}
unsafe impl<B: NativeApi + Sync> Sync for UsbDevice<B> {}

impl<B: NativeApi> UsbDevice<B> {
    pub fn empty(native: Native<B>) -> Self {
        Self {
            inner: Scoped::empty(DeviceUnref { native }),
        }
    }

    /// Take an additional reference to `raw`
    ///
    /// The caller's own reference, if any, is untouched.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live device of `native`'s backend.
    pub unsafe fn from_raw(native: Native<B>, raw: *mut libusb_device) -> Self {
        let raw = unsafe { ref_device(native.backend(), raw) };
        Self {
            // SAFETY: the reference taken above belongs to this value.
            inner: unsafe { Scoped::from_raw(raw, DeviceUnref { native }) },
        }
    }

    pub fn as_raw(&self) -> *mut libusb_device {
        self.inner.as_ptr()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn native(&self) -> &Native<B> {
        &self.inner.disposer().native
    }

    /// Switch to `raw`: its reference is taken before the old one is dropped,
    /// so resetting to the current device is safe
    ///
    /// # Safety
    ///
    /// Same contract as [`UsbDevice::from_raw`].
    pub unsafe fn reset(&mut self, raw: *mut libusb_device) {
        let raw = unsafe { ref_device(self.native().backend(), raw) };
        // SAFETY: the new reference is ours; the old one is dropped by reset.
        unsafe { self.inner.reset(raw) };
    }

    /// Give up the reference without dropping it; the caller must unref it
    #[must_use = "the released device leaks unless libusb_unref_device is called"]
    pub fn release(&mut self) -> Option<NonNull<libusb_device>> {
        self.inner.release()
    }

    /// Open the device for I/O
    pub fn open(&self) -> Result<DeviceHandle<B>, UsbError> {
        let raw = self.require_raw()?;
        let native = self.native();
        let mut handle = ptr::null_mut();
        invoke(
            native.backend(),
            native.policies().call,
            "UsbDevice::open",
            "libusb_open",
            // SAFETY: `raw` is a referenced device; `handle` is an out-parameter.
            || unsafe { native.backend().open(raw, &mut handle) },
        )?;
        debug!("Opened device {:p} as handle {:p}", raw, handle);
        // SAFETY: libusb_open succeeded, the new handle is ours to close.
        Ok(unsafe { DeviceHandle::from_raw(native.clone(), handle) })
    }

    /// Fetch configuration descriptor `index`; works whether or not the device is open
    pub fn config_descriptor(&self, index: u8) -> Result<ConfigDescriptor<B>, UsbError> {
        self.config_descriptor_with(self.native().policies().call, index)
    }

    /// Configuration descriptor under an explicit policy
    ///
    /// With a non-raising policy a failed read is logged and an empty
    /// descriptor is returned.
    pub fn config_descriptor_with(
        &self,
        policy: CallPolicy,
        index: u8,
    ) -> Result<ConfigDescriptor<B>, UsbError> {
        let raw = self.require_raw()?;
        let native = self.native();
        let mut config = ptr::null();
        let rc = invoke(
            native.backend(),
            policy,
            "UsbDevice::config_descriptor",
            "libusb_get_config_descriptor",
            // SAFETY: `raw` is a referenced device; `config` is an out-parameter.
            || unsafe { native.backend().get_config_descriptor(raw, index, &mut config) },
        )?;
        if rc < 0 {
            return Ok(ConfigDescriptor::empty(native.clone()));
        }
        // SAFETY: on success libusb allocated `config` for us to free.
        Ok(unsafe { ConfigDescriptor::from_raw(native.clone(), config) })
    }

    pub fn device_descriptor(&self) -> Result<DeviceDescriptor, UsbError> {
        self.device_descriptor_with(self.native().policies().call)
    }

    /// Device descriptor under the context's query policy; zeroed on failure
    pub fn device_descriptor_or_default(&self) -> DeviceDescriptor {
        let policy = CallPolicy {
            raise: false,
            ..self.native().policies().query
        };
        self.device_descriptor_with(policy).unwrap_or_default()
    }

    /// Device descriptor under an explicit policy
    ///
    /// With a non-raising policy a failed read is logged and the zeroed
    /// descriptor is returned.
    pub fn device_descriptor_with(&self, policy: CallPolicy) -> Result<DeviceDescriptor, UsbError> {
        let raw = self.require_raw()?;
        let backend = self.native().backend();
        let mut descriptor = MaybeUninit::<libusb_device_descriptor>::zeroed();
        invoke(
            backend,
            policy,
            "UsbDevice::device_descriptor",
            "libusb_get_device_descriptor",
            // SAFETY: `raw` is a referenced device; the out-parameter is writable.
            || unsafe { backend.get_device_descriptor(raw, descriptor.as_mut_ptr()) },
        )?;
        // SAFETY: zero is a valid value for every field and libusb only writes
        // whole fields.
        Ok(DeviceDescriptor::from(unsafe { descriptor.assume_init_ref() }))
    }

    /// Bus number; 0 for an empty device
    pub fn bus_number(&self) -> u8 {
        let raw = self.as_raw();
        if raw.is_null() {
            return 0;
        }
        // SAFETY: `raw` is a referenced device.
        unsafe { self.native().backend().get_bus_number(raw) }
    }

    /// Address on the bus; 0 for an empty device
    pub fn address(&self) -> u8 {
        let raw = self.as_raw();
        if raw.is_null() {
            return 0;
        }
        // SAFETY: `raw` is a referenced device.
        unsafe { self.native().backend().get_device_address(raw) }
    }

    /// Port numbers from the root hub down to this device
    pub fn port_numbers(&self) -> Result<Vec<u8>, UsbError> {
        let raw = self.require_raw()?;
        let native = self.native();
        let mut ports = [0u8; MAX_PORT_NUMBERS];
        let count = invoke(
            native.backend(),
            native.policies().call,
            "UsbDevice::port_numbers",
            "libusb_get_port_numbers",
            // SAFETY: the buffer holds MAX_PORT_NUMBERS bytes.
            || unsafe {
                native.backend().get_port_numbers(
                    raw,
                    ports.as_mut_ptr(),
                    MAX_PORT_NUMBERS as c_int,
                )
            },
        )?;
        let count = (count as usize).min(MAX_PORT_NUMBERS);
        Ok(ports[..count].to_vec())
    }

    /// `bus.port.port...`, or `bus.0` when the device reports no ports
    pub fn path(&self) -> Result<String, UsbError> {
        let ports = self.port_numbers()?;
        let mut path = self.bus_number().to_string();
        if ports.is_empty() {
            path.push_str(".0");
        }
        for port in ports {
            // Writing to a String cannot fail
            let _ = write!(path, ".{}", port);
        }
        Ok(path)
    }

    fn require_raw(&self) -> Result<*mut libusb_device, UsbError> {
        let raw = self.as_raw();
        if raw.is_null() {
            return Err(ErrorCode::InvalidParam.into());
        }
        Ok(raw)
    }
}

impl<B: NativeApi> Clone for UsbDevice<B> {
    /// Takes another native reference to the same device
    fn clone(&self) -> Self {
        // SAFETY: our own reference keeps the device alive.
        unsafe { Self::from_raw(self.native().clone(), self.as_raw()) }
    }
}

/// Increment the reference count of a non-null device
unsafe fn ref_device<B: NativeApi>(backend: &B, raw: *mut libusb_device) -> *mut libusb_device {
    if raw.is_null() {
        return raw;
    }
    unsafe { backend.ref_device(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::Policies;
    use crate::test_utils::{LogCapture, MockDevice, MockUsb};
    use tracing::Level;

    fn native(mock: &MockUsb) -> Native<MockUsb> {
        Native::new(mock.clone())
    }

    #[test]
    fn test_wrap_takes_one_reference() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 2));
        let before = mock.refcount(raw);

        let device = unsafe { UsbDevice::from_raw(native(&mock), raw) };
        assert_eq!(mock.refcount(raw), before + 1);
        drop(device);
        assert_eq!(mock.refcount(raw), before);
    }

    #[test]
    fn test_clone_is_explicit_alias() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 2));
        let before = mock.refcount(raw);

        let device = unsafe { UsbDevice::from_raw(native(&mock), raw) };
        let alias = device.clone();
        assert_eq!(alias.as_raw(), device.as_raw());
        assert_eq!(mock.refcount(raw), before + 2);
        drop(device);
        drop(alias);
        assert_eq!(mock.refcount(raw), before);
    }

    #[test]
    fn test_reset_to_same_device_keeps_count() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 2));
        let before = mock.refcount(raw);

        let mut device = unsafe { UsbDevice::from_raw(native(&mock), raw) };
        unsafe { device.reset(raw) };
        assert_eq!(mock.refcount(raw), before + 1);
        unsafe { device.reset(ptr::null_mut()) };
        assert!(device.is_empty());
        assert_eq!(mock.refcount(raw), before);
        assert_eq!(mock.misuse_count(), 0);
    }

    #[test]
    fn test_device_descriptor() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(0x03e7, 0x2485));
        let device = unsafe { UsbDevice::from_raw(native(&mock), raw) };
        let descriptor = device.device_descriptor().unwrap();
        assert_eq!(descriptor.vendor_id, 0x03e7);
        assert_eq!(descriptor.product_id, 0x2485);
    }

    #[test]
    fn test_device_descriptor_non_raising() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(0x03e7, 0x2485));
        mock.fail("libusb_get_device_descriptor", -1);
        let device = unsafe { UsbDevice::from_raw(native(&mock), raw) };

        assert_eq!(device.device_descriptor().unwrap_err().code(), -1);
        let descriptor = device.device_descriptor_with(CallPolicy::LOG_ONLY).unwrap();
        assert_eq!(descriptor, DeviceDescriptor::default());
    }

    #[test]
    fn test_config_descriptor_freed_once() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 2).interfaces(2));
        let device = unsafe { UsbDevice::from_raw(native(&mock), raw) };

        let config = device.config_descriptor(0).unwrap();
        assert_eq!(config.num_interfaces(), 2);
        assert_eq!(config.configuration_value(), 1);
        assert_eq!(mock.live_config_descriptors(), 1);
        drop(config);
        assert_eq!(mock.live_config_descriptors(), 0);
        assert_eq!(mock.misuse_count(), 0);
    }

    #[test]
    fn test_config_descriptor_failure() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 2));
        let device = unsafe { UsbDevice::from_raw(native(&mock), raw) };
        let err = device.config_descriptor(4).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::NotFound);
        assert_eq!(mock.live_config_descriptors(), 0);
    }

    #[test]
    fn test_config_descriptor_log_only() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 2));
        let device = unsafe { UsbDevice::from_raw(native(&mock), raw) };
        let capture = LogCapture::new();

        let policy = CallPolicy::LOG_ONLY.with_level(Level::WARN);
        let config = capture
            .in_scope(|| device.config_descriptor_with(policy, 4))
            .unwrap();
        assert!(config.is_empty());
        assert_eq!(config.num_interfaces(), 0);
        assert_eq!(capture.count(Level::WARN), 1);
        drop(config);
        assert_eq!(mock.count_calls("libusb_free_config_descriptor"), 0);
    }

    #[test]
    fn test_device_descriptor_uses_query_policy() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(0x03e7, 0x2485));
        let policies = Policies {
            query: CallPolicy::LOG_ONLY.with_level(Level::DEBUG),
            ..Policies::default()
        };
        let device =
            unsafe { UsbDevice::from_raw(Native::with_policies(mock.clone(), policies), raw) };
        assert_eq!(device.device_descriptor_or_default().vendor_id, 0x03e7);

        mock.fail("libusb_get_device_descriptor", -1);
        let capture = LogCapture::new();
        let descriptor = capture.in_scope(|| device.device_descriptor_or_default());
        assert_eq!(descriptor, DeviceDescriptor::default());
        assert_eq!(capture.count(Level::DEBUG), 1);
        assert_eq!(capture.count(Level::ERROR), 0);
    }

    #[test]
    fn test_path_formats() {
        let mock = MockUsb::new();
        let nested = mock.attach(MockDevice::new(1, 2).bus(2).ports(&[1, 3]));
        let root = mock.attach(MockDevice::new(1, 3).bus(4));
        let nested = unsafe { UsbDevice::from_raw(native(&mock), nested) };
        let root = unsafe { UsbDevice::from_raw(native(&mock), root) };
        assert_eq!(nested.path().unwrap(), "2.1.3");
        assert_eq!(root.path().unwrap(), "4.0");
    }

    #[test]
    fn test_empty_device_rejects_calls() {
        let mock = MockUsb::new();
        let device = UsbDevice::empty(native(&mock));
        assert_eq!(device.open().unwrap_err().kind(), ErrorCode::InvalidParam);
        assert_eq!(device.bus_number(), 0);
        assert!(mock.calls().is_empty());
    }
}
