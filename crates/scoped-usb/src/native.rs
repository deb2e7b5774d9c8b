//! The native libusb API seam
//!
//! [`NativeApi`] lists the C functions this layer consumes, one method each,
//! with the C signatures kept as they are: raw pointers in, signed codes out.
//! [`Libusb`] forwards to the real library through `rusb::ffi`. Tests plug in
//! [`crate::test_utils::MockUsb`] instead.
//!
//! Every resource type carries a [`Native`] token: the backend together with
//! the [`Policies`] that decide how failed calls are logged.

use crate::invoke::Policies;
use rusb::ffi;
use std::ffi::{CStr, c_int};

pub use ffi::{
    libusb_config_descriptor, libusb_context, libusb_device, libusb_device_descriptor,
    libusb_device_handle,
};

/// The C-style host-control API
///
/// # Safety
///
/// The raw-pointer methods carry the preconditions of the libusb function of
/// the same name: pointers must come from this backend and still be live.
pub trait NativeApi: Clone {
    /// Code-to-string translator for native return codes
    fn strerror(&self, code: c_int) -> String;

    unsafe fn init(&self, context: *mut *mut libusb_context) -> c_int;
    unsafe fn exit(&self, context: *mut libusb_context);

    unsafe fn get_device_list(
        &self,
        context: *mut libusb_context,
        list: *mut *const *mut libusb_device,
    ) -> isize;
    unsafe fn free_device_list(&self, list: *const *mut libusb_device, unref_devices: c_int);

    unsafe fn ref_device(&self, device: *mut libusb_device) -> *mut libusb_device;
    unsafe fn unref_device(&self, device: *mut libusb_device);

    unsafe fn open(
        &self,
        device: *mut libusb_device,
        handle: *mut *mut libusb_device_handle,
    ) -> c_int;
    unsafe fn wrap_sys_device(
        &self,
        context: *mut libusb_context,
        sys_device: isize,
        handle: *mut *mut libusb_device_handle,
    ) -> c_int;
    unsafe fn close(&self, handle: *mut libusb_device_handle);
    unsafe fn get_device(&self, handle: *mut libusb_device_handle) -> *mut libusb_device;

    unsafe fn get_device_descriptor(
        &self,
        device: *mut libusb_device,
        descriptor: *mut libusb_device_descriptor,
    ) -> c_int;
    unsafe fn get_config_descriptor(
        &self,
        device: *mut libusb_device,
        config_index: u8,
        config: *mut *const libusb_config_descriptor,
    ) -> c_int;
    unsafe fn free_config_descriptor(&self, config: *const libusb_config_descriptor);

    unsafe fn claim_interface(&self, handle: *mut libusb_device_handle, interface: c_int) -> c_int;
    unsafe fn release_interface(&self, handle: *mut libusb_device_handle, interface: c_int)
    -> c_int;
    unsafe fn set_configuration(
        &self,
        handle: *mut libusb_device_handle,
        configuration: c_int,
    ) -> c_int;
    unsafe fn get_configuration(
        &self,
        handle: *mut libusb_device_handle,
        configuration: *mut c_int,
    ) -> c_int;
    unsafe fn set_auto_detach_kernel_driver(
        &self,
        handle: *mut libusb_device_handle,
        enable: c_int,
    ) -> c_int;

    unsafe fn get_bus_number(&self, device: *mut libusb_device) -> u8;
    unsafe fn get_device_address(&self, device: *mut libusb_device) -> u8;
    unsafe fn get_port_numbers(
        &self,
        device: *mut libusb_device,
        port_numbers: *mut u8,
        len: c_int,
    ) -> c_int;
}

/// The system libusb, reached through `rusb::ffi`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Libusb;

impl NativeApi for Libusb {
    fn strerror(&self, code: c_int) -> String {
        // SAFETY: libusb_strerror returns a pointer to a static NUL-terminated
        // string for every input, including unknown codes.
        unsafe { CStr::from_ptr(ffi::libusb_strerror(code)) }
            .to_string_lossy()
            .into_owned()
    }

    unsafe fn init(&self, context: *mut *mut libusb_context) -> c_int {
        unsafe { ffi::libusb_init(context) }
    }

    unsafe fn exit(&self, context: *mut libusb_context) {
        unsafe { ffi::libusb_exit(context) }
    }

    unsafe fn get_device_list(
        &self,
        context: *mut libusb_context,
        list: *mut *const *mut libusb_device,
    ) -> isize {
        unsafe { ffi::libusb_get_device_list(context, list) as isize }
    }

    unsafe fn free_device_list(&self, list: *const *mut libusb_device, unref_devices: c_int) {
        unsafe { ffi::libusb_free_device_list(list, unref_devices) }
    }

    unsafe fn ref_device(&self, device: *mut libusb_device) -> *mut libusb_device {
        unsafe { ffi::libusb_ref_device(device) }
    }

    unsafe fn unref_device(&self, device: *mut libusb_device) {
        unsafe { ffi::libusb_unref_device(device) }
    }

    unsafe fn open(
        &self,
        device: *mut libusb_device,
        handle: *mut *mut libusb_device_handle,
    ) -> c_int {
        unsafe { ffi::libusb_open(device, handle) }
    }

    unsafe fn wrap_sys_device(
        &self,
        context: *mut libusb_context,
        sys_device: isize,
        handle: *mut *mut libusb_device_handle,
    ) -> c_int {
        unsafe { ffi::libusb_wrap_sys_device(context, sys_device as _, handle) }
    }

    unsafe fn close(&self, handle: *mut libusb_device_handle) {
        unsafe { ffi::libusb_close(handle) }
    }

    unsafe fn get_device(&self, handle: *mut libusb_device_handle) -> *mut libusb_device {
        unsafe { ffi::libusb_get_device(handle) }
    }

    unsafe fn get_device_descriptor(
        &self,
        device: *mut libusb_device,
        descriptor: *mut libusb_device_descriptor,
    ) -> c_int {
        unsafe { ffi::libusb_get_device_descriptor(device, descriptor) }
    }

    unsafe fn get_config_descriptor(
        &self,
        device: *mut libusb_device,
        config_index: u8,
        config: *mut *const libusb_config_descriptor,
    ) -> c_int {
        unsafe { ffi::libusb_get_config_descriptor(device, config_index, config) }
    }

    unsafe fn free_config_descriptor(&self, config: *const libusb_config_descriptor) {
        unsafe { ffi::libusb_free_config_descriptor(config) }
    }

    unsafe fn claim_interface(&self, handle: *mut libusb_device_handle, interface: c_int) -> c_int {
        unsafe { ffi::libusb_claim_interface(handle, interface) }
    }

    unsafe fn release_interface(
        &self,
        handle: *mut libusb_device_handle,
        interface: c_int,
    ) -> c_int {
        unsafe { ffi::libusb_release_interface(handle, interface) }
    }

    unsafe fn set_configuration(
        &self,
        handle: *mut libusb_device_handle,
        configuration: c_int,
    ) -> c_int {
        unsafe { ffi::libusb_set_configuration(handle, configuration) }
    }

    unsafe fn get_configuration(
        &self,
        handle: *mut libusb_device_handle,
        configuration: *mut c_int,
    ) -> c_int {
        unsafe { ffi::libusb_get_configuration(handle, configuration) }
    }

    unsafe fn set_auto_detach_kernel_driver(
        &self,
        handle: *mut libusb_device_handle,
        enable: c_int,
    ) -> c_int {
        unsafe { ffi::libusb_set_auto_detach_kernel_driver(handle, enable) }
    }

    unsafe fn get_bus_number(&self, device: *mut libusb_device) -> u8 {
        unsafe { ffi::libusb_get_bus_number(device) }
    }

    unsafe fn get_device_address(&self, device: *mut libusb_device) -> u8 {
        unsafe { ffi::libusb_get_device_address(device) }
    }

    unsafe fn get_port_numbers(
        &self,
        device: *mut libusb_device,
        port_numbers: *mut u8,
        len: c_int,
    ) -> c_int {
        unsafe { ffi::libusb_get_port_numbers(device, port_numbers, len) }
    }
}

/// Backend plus call policies, shared by every resource of one context
#[derive(Debug, Clone, Default)]
pub struct Native<B: NativeApi = Libusb> {
    backend: B,
    policies: Policies,
}

impl<B: NativeApi> Native<B> {
    pub fn new(backend: B) -> Self {
        Self::with_policies(backend, Policies::default())
    }

    pub fn with_policies(backend: B, policies: Policies) -> Self {
        Self { backend, policies }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policies(&self) -> &Policies {
        &self.policies
    }
}
