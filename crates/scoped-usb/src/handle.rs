//! Open device handle with claimed-interface bookkeeping
//!
//! A [`DeviceHandle`] closes its channel on drop, but first releases every
//! interface it claimed, in claim order. Release failures at that point are
//! logged under the cleanup policy and never returned; the close always
//! happens.

use crate::context::UsbContext;
use crate::device::UsbDevice;
use crate::error::{ErrorCode, UsbError};
use crate::invoke::{CallPolicy, invoke};
use crate::native::{Libusb, Native, NativeApi, libusb_device_handle};
use crate::scoped::{Disposer, Scoped};
use std::ffi::c_int;
use std::ptr::{self, NonNull};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HandleClose<B: NativeApi> {
    native: Native<B>,
}

impl<B: NativeApi> Disposer for HandleClose<B> {
    type Target = libusb_device_handle;

    fn dispose(&mut self, raw: NonNull<libusb_device_handle>) {
        // SAFETY: the handle is owned and closed exactly once here.
        unsafe { self.native.backend().close(raw.as_ptr()) };
        debug!("Closed device handle {:p}", raw);
    }
}

#[derive(Debug)]
pub struct DeviceHandle<B: NativeApi = Libusb> {
    inner: Scoped<HandleClose<B>>,
    /// Interfaces claimed through this handle, in claim order
    claimed: Vec<u8>,
}

// SAFETY: libusb handles may be used from any thread; `&mut self` methods
// serialise claim bookkeeping.
unsafe impl<B: NativeApi + Send> Send for DeviceHandle<B> {}

impl<B: NativeApi> DeviceHandle<B> {
    pub fn empty(native: Native<B>) -> Self {
        Self {
            inner: Scoped::empty(HandleClose { native }),
            claimed: Vec::new(),
        }
    }

    /// Open `device`; same as [`UsbDevice::open`]
    pub fn open(device: &UsbDevice<B>) -> Result<Self, UsbError> {
        device.open()
    }

    /// Adopt a platform handle obtained outside libusb (e.g. an Android file
    /// descriptor)
    ///
    /// Never call `libusb_open` on the device behind a wrapped handle.
    pub fn wrap_sys_device(context: &UsbContext<B>, sys_device: isize) -> Result<Self, UsbError> {
        let native = context.native();
        let mut handle = ptr::null_mut();
        invoke(
            native.backend(),
            native.policies().call,
            "DeviceHandle::wrap_sys_device",
            "libusb_wrap_sys_device",
            // SAFETY: the context is live; `handle` is an out-parameter.
            || unsafe {
                native
                    .backend()
                    .wrap_sys_device(context.as_raw(), sys_device, &mut handle)
            },
        )?;
        debug!("Wrapped system device {} as handle {:p}", sys_device, handle);
        // SAFETY: on success the new handle is ours to close.
        Ok(unsafe { Self::from_raw(native.clone(), handle) })
    }

    /// Adopt an open handle with nothing claimed
    ///
    /// # Safety
    ///
    /// `raw` must be null or an open handle nobody else will close.
    pub unsafe fn from_raw(native: Native<B>, raw: *mut libusb_device_handle) -> Self {
        Self {
            inner: unsafe { Scoped::from_raw(raw, HandleClose { native }) },
            claimed: Vec::new(),
        }
    }

    pub fn as_raw(&self) -> *mut libusb_device_handle {
        self.inner.as_ptr()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn native(&self) -> &Native<B> {
        &self.inner.disposer().native
    }

    pub fn claimed_interfaces(&self) -> &[u8] {
        &self.claimed
    }

    pub fn is_claimed(&self, interface: u8) -> bool {
        self.claimed.contains(&interface)
    }

    /// Claim `interface`; claiming an already claimed interface does nothing
    pub fn claim_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        if self.is_claimed(interface) {
            return Ok(());
        }
        let raw = self.require_raw()?;
        let native = self.native();
        invoke(
            native.backend(),
            native.policies().call,
            "DeviceHandle::claim_interface",
            "libusb_claim_interface",
            // SAFETY: `raw` is an open handle.
            || unsafe { native.backend().claim_interface(raw, c_int::from(interface)) },
        )?;
        debug!("Claimed interface {} on handle {:p}", interface, raw);
        self.claimed.push(interface);
        Ok(())
    }

    /// Release `interface`; releasing an interface not claimed here does nothing
    pub fn release_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        let Some(position) = self.claimed.iter().position(|&n| n == interface) else {
            return Ok(());
        };
        let raw = self.require_raw()?;
        let native = self.native();
        invoke(
            native.backend(),
            native.policies().call,
            "DeviceHandle::release_interface",
            "libusb_release_interface",
            // SAFETY: `raw` is an open handle.
            || unsafe { native.backend().release_interface(raw, c_int::from(interface)) },
        )?;
        debug!("Released interface {} on handle {:p}", interface, raw);
        self.claimed.remove(position);
        Ok(())
    }

    pub fn set_configuration(&self, configuration: c_int) -> Result<(), UsbError> {
        let raw = self.require_raw()?;
        let native = self.native();
        invoke(
            native.backend(),
            native.policies().call,
            "DeviceHandle::set_configuration",
            "libusb_set_configuration",
            // SAFETY: `raw` is an open handle.
            || unsafe { native.backend().set_configuration(raw, configuration) },
        )?;
        Ok(())
    }

    /// Active configuration value; 0 when unconfigured
    pub fn configuration(&self) -> Result<c_int, UsbError> {
        self.configuration_with(self.native().policies().call)
    }

    /// Active configuration under the context's query policy; 0 on failure
    pub fn configuration_or_default(&self) -> c_int {
        let policy = CallPolicy {
            raise: false,
            ..self.native().policies().query
        };
        self.configuration_with(policy).unwrap_or_default()
    }

    /// Active configuration under an explicit policy
    ///
    /// With a non-raising policy a failed query is logged and 0 is returned.
    pub fn configuration_with(&self, policy: CallPolicy) -> Result<c_int, UsbError> {
        let raw = self.require_raw()?;
        let backend = self.native().backend();
        let mut configuration: c_int = 0;
        let rc = invoke(
            backend,
            policy,
            "DeviceHandle::configuration",
            "libusb_get_configuration",
            // SAFETY: `raw` is an open handle; `configuration` is an out-parameter.
            || unsafe { backend.get_configuration(raw, &mut configuration) },
        )?;
        Ok(if rc < 0 { 0 } else { configuration })
    }

    pub fn set_auto_detach_kernel_driver(&self, enable: bool) -> Result<(), UsbError> {
        self.set_auto_detach_kernel_driver_with(self.native().policies().call, enable)
    }

    /// Toggle automatic kernel driver detach under an explicit policy
    ///
    /// Platforms without kernel drivers report `NotSupported`; a non-raising
    /// policy lets callers treat that as success.
    pub fn set_auto_detach_kernel_driver_with(
        &self,
        policy: CallPolicy,
        enable: bool,
    ) -> Result<(), UsbError> {
        let raw = self.require_raw()?;
        let backend = self.native().backend();
        invoke(
            backend,
            policy,
            "DeviceHandle::set_auto_detach_kernel_driver",
            "libusb_set_auto_detach_kernel_driver",
            // SAFETY: `raw` is an open handle.
            || unsafe { backend.set_auto_detach_kernel_driver(raw, c_int::from(enable)) },
        )?;
        Ok(())
    }

    /// The device behind this handle, with a reference of its own
    pub fn device(&self) -> Result<UsbDevice<B>, UsbError> {
        let raw = self.require_raw()?;
        let native = self.native();
        // SAFETY: `raw` is an open handle.
        let device = unsafe { native.backend().get_device(raw) };
        if device.is_null() {
            return Err(ErrorCode::NoDevice.into());
        }
        // SAFETY: the handle keeps the device alive while we take our reference.
        Ok(unsafe { UsbDevice::from_raw(native.clone(), device) })
    }

    /// Release every claimed interface, close the channel and adopt `raw`
    ///
    /// Release failures are logged and skipped.
    ///
    /// # Safety
    ///
    /// Same contract as [`DeviceHandle::from_raw`].
    pub unsafe fn reset(&mut self, raw: *mut libusb_device_handle) {
        self.release_claimed();
        // SAFETY: forwarded contract.
        unsafe { self.inner.reset(raw) };
        self.claimed.clear();
    }

    /// Release every claimed interface and close the channel
    pub fn close(&mut self) {
        // SAFETY: null is always acceptable.
        unsafe { self.reset(ptr::null_mut()) };
    }

    /// Give up the handle without releasing interfaces or closing it
    ///
    /// The claimed set is forgotten: the new owner must know which interfaces
    /// are claimed and release them before `libusb_close`.
    #[must_use = "the released handle leaks unless libusb_close is called"]
    pub fn release(&mut self) -> Option<NonNull<libusb_device_handle>> {
        self.claimed.clear();
        self.inner.release()
    }

    fn release_claimed(&mut self) {
        let raw = self.as_raw();
        if raw.is_null() {
            return;
        }
        let native = self.native();
        let policy = CallPolicy {
            raise: false,
            ..native.policies().cleanup
        };
        for &interface in &self.claimed {
            // A non-raising policy never yields Err
            let _ = invoke(
                native.backend(),
                policy,
                "DeviceHandle::reset",
                "libusb_release_interface",
                // SAFETY: `raw` is still open; it is closed after this loop.
                || unsafe { native.backend().release_interface(raw, c_int::from(interface)) },
            );
        }
    }

    fn require_raw(&self) -> Result<*mut libusb_device_handle, UsbError> {
        let raw = self.as_raw();
        if raw.is_null() {
            return Err(ErrorCode::InvalidParam.into());
        }
        Ok(raw)
    }
}

impl<B: NativeApi> Drop for DeviceHandle<B> {
    fn drop(&mut self) {
        self.close();
    }
}
