//! Test utilities for scoped-usb
//!
//! [`MockUsb`] is an in-process [`NativeApi`] with observable state: device
//! reference counts, a journal of native calls, injectable failure codes, and
//! a misuse log for double frees and reference underflows. [`LogCapture`]
//! counts the tracing events emitted while a closure runs.
//!
//! # Example
//!
//! ```
//! use scoped_usb::UsbContext;
//! use scoped_usb::test_utils::{MockDevice, MockUsb};
//!
//! let mock = MockUsb::new();
//! let raw = mock.attach(MockDevice::new(0x03e7, 0x2485));
//! let context = UsbContext::with_backend(mock.clone()).unwrap();
//! let devices = context.devices().unwrap();
//! assert_eq!(devices.len(), 1);
//! assert_eq!(devices.first(), Some(raw));
//! ```

use crate::error::{ErrorCode, describe_code};
use crate::native::{
    NativeApi, libusb_config_descriptor, libusb_context, libusb_device, libusb_device_descriptor,
    libusb_device_handle,
};
use rusb::ffi::{libusb_interface, libusb_interface_descriptor};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::c_int;
use std::fmt;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;

const FIRST_ID: usize = 0x1000;
const ID_STRIDE: usize = 0x10;

/// A simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
    pub ports: Vec<u8>,
    pub interfaces: u8,
    pub configurations: u8,
}

impl MockDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            bus: 1,
            address: 0,
            ports: Vec::new(),
            interfaces: 1,
            configurations: 1,
        }
    }

    pub fn bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn ports(mut self, ports: &[u8]) -> Self {
        self.ports = ports.to_vec();
        self
    }

    pub fn interfaces(mut self, interfaces: u8) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn configurations(mut self, configurations: u8) -> Self {
        self.configurations = configurations;
        self
    }
}

/// One journal entry: native function name and its interesting argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCall {
    pub function: &'static str,
    pub argument: Option<i64>,
}

impl fmt::Display for NativeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument {
            Some(argument) => write!(f, "{}({})", self.function, argument),
            None => write!(f, "{}()", self.function),
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    info: MockDevice,
    refcount: usize,
}

#[derive(Debug, Default)]
struct HandleState {
    device: Option<usize>,
    claimed: Vec<c_int>,
    configuration: c_int,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: usize,
    contexts: BTreeSet<usize>,
    devices: BTreeMap<usize, DeviceState>,
    handles: BTreeMap<usize, HandleState>,
    /// Live device list arrays: address -> entry count
    lists: BTreeMap<usize, usize>,
    config_descriptors: BTreeSet<usize>,
    calls: Vec<NativeCall>,
    failures: HashMap<&'static str, c_int>,
    release_failures: HashMap<c_int, c_int>,
    misuse: Vec<String>,
}

impl MockState {
    fn allocate_id(&mut self) -> usize {
        if self.next_id == 0 {
            self.next_id = FIRST_ID;
        }
        let id = self.next_id;
        self.next_id += ID_STRIDE;
        id
    }

    fn record(&mut self, function: &'static str, argument: Option<i64>) {
        self.calls.push(NativeCall { function, argument });
    }

    fn injected(&self, function: &'static str) -> Option<c_int> {
        self.failures.get(function).copied()
    }

    fn device(&mut self, function: &'static str, device: usize) -> Option<&mut DeviceState> {
        if !self.devices.contains_key(&device) {
            self.misuse
                .push(format!("{}: unknown device {:#x}", function, device));
        }
        self.devices.get_mut(&device)
    }

    fn handle(&mut self, function: &'static str, handle: usize) -> Option<&mut HandleState> {
        if !self.handles.contains_key(&handle) {
            self.misuse
                .push(format!("{}: unknown handle {:#x}", function, handle));
        }
        self.handles.get_mut(&handle)
    }

    fn unref(&mut self, function: &'static str, device: usize) {
        let underflow = match self.device(function, device) {
            Some(state) if state.refcount > 0 => {
                state.refcount -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if underflow {
            self.misuse
                .push(format!("{}: reference underflow on {:#x}", function, device));
        }
    }
}

/// In-process stand-in for libusb
#[derive(Debug, Clone, Default)]
pub struct MockUsb {
    state: Arc<Mutex<MockState>>,
}

impl MockUsb {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug in a device; the bus holds its first reference
    pub fn attach(&self, device: MockDevice) -> *mut libusb_device {
        let mut state = self.state();
        let id = state.allocate_id();
        let mut info = device;
        if info.address == 0 {
            info.address = u8::try_from(state.devices.len() + 1).unwrap_or(u8::MAX);
        }
        state.devices.insert(id, DeviceState { info, refcount: 1 });
        ptr::without_provenance_mut(id)
    }

    /// Current reference count of `device`, 0 if unknown
    pub fn refcount(&self, device: *mut libusb_device) -> usize {
        self.state()
            .devices
            .get(&device.addr())
            .map_or(0, |d| d.refcount)
    }

    /// Make every call to `function` fail with `code` until cleared
    pub fn fail(&self, function: &'static str, code: c_int) {
        self.state().failures.insert(function, code);
    }

    /// Make releasing `interface` fail with `code` until cleared
    pub fn fail_release_of(&self, interface: u8, code: c_int) {
        self.state()
            .release_failures
            .insert(c_int::from(interface), code);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.release_failures.clear();
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.state().calls.clone()
    }

    /// The journal rendered as `function(argument)` strings
    pub fn journal(&self) -> Vec<String> {
        self.state().calls.iter().map(|c| c.to_string()).collect()
    }

    pub fn count_calls(&self, function: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.function == function)
            .count()
    }

    /// Interfaces the native layer considers claimed on `handle`
    pub fn native_claims(&self, handle: *mut libusb_device_handle) -> Vec<c_int> {
        self.state()
            .handles
            .get(&handle.addr())
            .map(|h| h.claimed.clone())
            .unwrap_or_default()
    }

    pub fn live_contexts(&self) -> usize {
        self.state().contexts.len()
    }

    pub fn live_handles(&self) -> usize {
        self.state().handles.len()
    }

    pub fn live_lists(&self) -> usize {
        self.state().lists.len()
    }

    pub fn live_config_descriptors(&self) -> usize {
        self.state().config_descriptors.len()
    }

    /// Double frees, unknown handles and reference underflows seen so far
    pub fn misuse(&self) -> Vec<String> {
        self.state().misuse.clone()
    }

    pub fn misuse_count(&self) -> usize {
        self.state().misuse.len()
    }
}

impl NativeApi for MockUsb {
    fn strerror(&self, code: c_int) -> String {
        describe_code(code).to_string()
    }

    unsafe fn init(&self, context: *mut *mut libusb_context) -> c_int {
        let mut state = self.state();
        state.record("libusb_init", None);
        if let Some(code) = state.injected("libusb_init") {
            return code;
        }
        let id = state.allocate_id();
        state.contexts.insert(id);
        unsafe { *context = ptr::without_provenance_mut(id) };
        0
    }

    unsafe fn exit(&self, context: *mut libusb_context) {
        let mut state = self.state();
        state.record("libusb_exit", None);
        if !state.contexts.remove(&context.addr()) {
            state
                .misuse
                .push(format!("libusb_exit: unknown context {:p}", context));
        }
    }

    unsafe fn get_device_list(
        &self,
        _context: *mut libusb_context,
        list: *mut *const *mut libusb_device,
    ) -> isize {
        let mut state = self.state();
        state.record("libusb_get_device_list", None);
        if let Some(code) = state.injected("libusb_get_device_list") {
            return code as isize;
        }

        let ids: Vec<usize> = state.devices.keys().copied().collect();
        for device in state.devices.values_mut() {
            device.refcount += 1;
        }
        let entries: Box<[*mut libusb_device]> = ids
            .iter()
            .map(|&id| ptr::without_provenance_mut(id))
            .chain(std::iter::once(ptr::null_mut()))
            .collect();
        let array = Box::into_raw(entries).cast::<*mut libusb_device>();
        state.lists.insert(array.addr(), ids.len());
        unsafe { *list = array.cast_const() };
        ids.len() as isize
    }

    unsafe fn free_device_list(&self, list: *const *mut libusb_device, unref_devices: c_int) {
        let mut state = self.state();
        state.record("libusb_free_device_list", Some(i64::from(unref_devices)));
        let Some(len) = state.lists.remove(&list.addr()) else {
            state
                .misuse
                .push(format!("libusb_free_device_list: unknown list {:p}", list));
            return;
        };

        // SAFETY: `list` is the array allocated in get_device_list with one
        // trailing null entry.
        let entries =
            unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(list.cast_mut(), len + 1)) };
        if unref_devices != 0 {
            for device in entries.iter().take(len) {
                state.unref("libusb_free_device_list", device.addr());
            }
        }
    }

    unsafe fn ref_device(&self, device: *mut libusb_device) -> *mut libusb_device {
        let mut state = self.state();
        state.record("libusb_ref_device", None);
        if let Some(device) = state.device("libusb_ref_device", device.addr()) {
            device.refcount += 1;
        }
        device
    }

    unsafe fn unref_device(&self, device: *mut libusb_device) {
        let mut state = self.state();
        state.record("libusb_unref_device", None);
        state.unref("libusb_unref_device", device.addr());
    }

    unsafe fn open(
        &self,
        device: *mut libusb_device,
        handle: *mut *mut libusb_device_handle,
    ) -> c_int {
        let mut state = self.state();
        state.record("libusb_open", None);
        if let Some(code) = state.injected("libusb_open") {
            return code;
        }
        match state.device("libusb_open", device.addr()) {
            // libusb_open keeps a device reference until close
            Some(d) if d.refcount > 0 => d.refcount += 1,
            _ => return ErrorCode::NoDevice.code(),
        }

        let id = state.allocate_id();
        state.handles.insert(
            id,
            HandleState {
                device: Some(device.addr()),
                ..HandleState::default()
            },
        );
        unsafe { *handle = ptr::without_provenance_mut(id) };
        0
    }

    unsafe fn wrap_sys_device(
        &self,
        _context: *mut libusb_context,
        sys_device: isize,
        handle: *mut *mut libusb_device_handle,
    ) -> c_int {
        let mut state = self.state();
        state.record("libusb_wrap_sys_device", Some(sys_device as i64));
        if let Some(code) = state.injected("libusb_wrap_sys_device") {
            return code;
        }
        // The wrapped descriptor resolves to the first live device
        let Some(device) = state
            .devices
            .iter_mut()
            .find(|(_, d)| d.refcount > 0)
            .map(|(&id, d)| {
                d.refcount += 1;
                id
            })
        else {
            return ErrorCode::NoDevice.code();
        };
        let id = state.allocate_id();
        state.handles.insert(
            id,
            HandleState {
                device: Some(device),
                ..HandleState::default()
            },
        );
        unsafe { *handle = ptr::without_provenance_mut(id) };
        0
    }

    unsafe fn close(&self, handle: *mut libusb_device_handle) {
        let mut state = self.state();
        state.record("libusb_close", None);
        match state.handles.remove(&handle.addr()) {
            Some(HandleState {
                device: Some(device),
                ..
            }) => state.unref("libusb_close", device),
            Some(_) => {}
            None => state
                .misuse
                .push(format!("libusb_close: unknown handle {:p}", handle)),
        }
    }

    unsafe fn get_device(&self, handle: *mut libusb_device_handle) -> *mut libusb_device {
        let mut state = self.state();
        state.record("libusb_get_device", None);
        state
            .handle("libusb_get_device", handle.addr())
            .and_then(|h| h.device)
            .map_or(ptr::null_mut(), ptr::without_provenance_mut)
    }

    unsafe fn get_device_descriptor(
        &self,
        device: *mut libusb_device,
        descriptor: *mut libusb_device_descriptor,
    ) -> c_int {
        let mut state = self.state();
        state.record("libusb_get_device_descriptor", None);
        if let Some(code) = state.injected("libusb_get_device_descriptor") {
            return code;
        }
        let Some(info) = state
            .device("libusb_get_device_descriptor", device.addr())
            .map(|d| d.info.clone())
        else {
            return ErrorCode::NoDevice.code();
        };

        // SAFETY: the caller passes a writable descriptor.
        let out = unsafe { &mut *descriptor };
        out.bLength = 18;
        out.bDescriptorType = 1;
        out.bcdUSB = 0x0200;
        out.bMaxPacketSize0 = 64;
        out.idVendor = info.vendor_id;
        out.idProduct = info.product_id;
        out.bNumConfigurations = info.configurations;
        0
    }

    unsafe fn get_config_descriptor(
        &self,
        device: *mut libusb_device,
        config_index: u8,
        config: *mut *const libusb_config_descriptor,
    ) -> c_int {
        let mut state = self.state();
        state.record(
            "libusb_get_config_descriptor",
            Some(i64::from(config_index)),
        );
        if let Some(code) = state.injected("libusb_get_config_descriptor") {
            return code;
        }
        let Some(info) = state
            .device("libusb_get_config_descriptor", device.addr())
            .map(|d| d.info.clone())
        else {
            return ErrorCode::NoDevice.code();
        };
        if config_index >= info.configurations {
            return ErrorCode::NotFound.code();
        }

        let descriptor = Box::into_raw(Box::new(build_config_descriptor(
            config_index + 1,
            info.interfaces,
        )));
        state.config_descriptors.insert(descriptor.addr());
        unsafe { *config = descriptor.cast_const() };
        0
    }

    unsafe fn free_config_descriptor(&self, config: *const libusb_config_descriptor) {
        let mut state = self.state();
        state.record("libusb_free_config_descriptor", None);
        if !state.config_descriptors.remove(&config.addr()) {
            state.misuse.push(format!(
                "libusb_free_config_descriptor: unknown descriptor {:p}",
                config
            ));
            return;
        }
        // SAFETY: allocated by get_config_descriptor and freed exactly once.
        unsafe { free_config_descriptor(config.cast_mut()) };
    }

    unsafe fn claim_interface(&self, handle: *mut libusb_device_handle, interface: c_int) -> c_int {
        let mut state = self.state();
        state.record("libusb_claim_interface", Some(i64::from(interface)));
        if let Some(code) = state.injected("libusb_claim_interface") {
            return code;
        }
        let Some(device) = state
            .handle("libusb_claim_interface", handle.addr())
            .map(|h| h.device)
        else {
            return ErrorCode::NoDevice.code();
        };
        let interfaces = device
            .and_then(|d| state.devices.get(&d))
            .map_or(u8::MAX, |d| d.info.interfaces);
        if interface < 0 || interface >= c_int::from(interfaces) {
            return ErrorCode::NotFound.code();
        }
        if let Some(h) = state.handles.get_mut(&handle.addr()) {
            if !h.claimed.contains(&interface) {
                h.claimed.push(interface);
            }
        }
        0
    }

    unsafe fn release_interface(&self, handle: *mut libusb_device_handle, interface: c_int) -> c_int {
        let mut state = self.state();
        state.record("libusb_release_interface", Some(i64::from(interface)));
        if let Some(code) = state
            .release_failures
            .get(&interface)
            .copied()
            .or_else(|| state.injected("libusb_release_interface"))
        {
            return code;
        }
        let Some(h) = state.handle("libusb_release_interface", handle.addr()) else {
            return ErrorCode::NoDevice.code();
        };
        match h.claimed.iter().position(|&n| n == interface) {
            Some(position) => {
                h.claimed.remove(position);
                0
            }
            None => ErrorCode::NotFound.code(),
        }
    }

    unsafe fn set_configuration(
        &self,
        handle: *mut libusb_device_handle,
        configuration: c_int,
    ) -> c_int {
        let mut state = self.state();
        state.record("libusb_set_configuration", Some(i64::from(configuration)));
        if let Some(code) = state.injected("libusb_set_configuration") {
            return code;
        }
        match state.handle("libusb_set_configuration", handle.addr()) {
            Some(h) => {
                h.configuration = configuration.max(0);
                0
            }
            None => ErrorCode::NoDevice.code(),
        }
    }

    unsafe fn get_configuration(
        &self,
        handle: *mut libusb_device_handle,
        configuration: *mut c_int,
    ) -> c_int {
        let mut state = self.state();
        state.record("libusb_get_configuration", None);
        if let Some(code) = state.injected("libusb_get_configuration") {
            return code;
        }
        match state.handle("libusb_get_configuration", handle.addr()) {
            Some(h) => {
                unsafe { *configuration = h.configuration };
                0
            }
            None => ErrorCode::NoDevice.code(),
        }
    }

    unsafe fn set_auto_detach_kernel_driver(
        &self,
        handle: *mut libusb_device_handle,
        enable: c_int,
    ) -> c_int {
        let mut state = self.state();
        state.record(
            "libusb_set_auto_detach_kernel_driver",
            Some(i64::from(enable)),
        );
        if let Some(code) = state.injected("libusb_set_auto_detach_kernel_driver") {
            return code;
        }
        match state.handle("libusb_set_auto_detach_kernel_driver", handle.addr()) {
            Some(_) => 0,
            None => ErrorCode::NoDevice.code(),
        }
    }

    unsafe fn get_bus_number(&self, device: *mut libusb_device) -> u8 {
        let mut state = self.state();
        state.record("libusb_get_bus_number", None);
        state
            .device("libusb_get_bus_number", device.addr())
            .map_or(0, |d| d.info.bus)
    }

    unsafe fn get_device_address(&self, device: *mut libusb_device) -> u8 {
        let mut state = self.state();
        state.record("libusb_get_device_address", None);
        state
            .device("libusb_get_device_address", device.addr())
            .map_or(0, |d| d.info.address)
    }

    unsafe fn get_port_numbers(
        &self,
        device: *mut libusb_device,
        port_numbers: *mut u8,
        len: c_int,
    ) -> c_int {
        let mut state = self.state();
        state.record("libusb_get_port_numbers", None);
        if let Some(code) = state.injected("libusb_get_port_numbers") {
            return code;
        }
        let Some(ports) = state
            .device("libusb_get_port_numbers", device.addr())
            .map(|d| d.info.ports.clone())
        else {
            return ErrorCode::NoDevice.code();
        };
        if ports.len() > usize::try_from(len).unwrap_or(0) {
            return ErrorCode::Overflow.code();
        }
        // SAFETY: the caller's buffer holds `len` bytes and `ports` fits.
        unsafe { ptr::copy_nonoverlapping(ports.as_ptr(), port_numbers, ports.len()) };
        ports.len() as c_int
    }
}

fn build_config_descriptor(value: u8, interfaces: u8) -> libusb_config_descriptor {
    let interface_array: Box<[libusb_interface]> = (0..interfaces)
        .map(|number| {
            // SAFETY: the FFI structs are plain integers and pointers.
            let mut altsetting: libusb_interface_descriptor = unsafe { std::mem::zeroed() };
            altsetting.bLength = 9;
            altsetting.bDescriptorType = 4;
            altsetting.bInterfaceNumber = number;
            let mut interface: libusb_interface = unsafe { std::mem::zeroed() };
            interface.altsetting = Box::into_raw(Box::new(altsetting)).cast_const();
            interface.num_altsetting = 1;
            interface
        })
        .collect();

    // SAFETY: as above.
    let mut descriptor: libusb_config_descriptor = unsafe { std::mem::zeroed() };
    descriptor.bLength = 9;
    descriptor.bDescriptorType = 2;
    descriptor.wTotalLength = 9 + 9 * u16::from(interfaces);
    descriptor.bNumInterfaces = interfaces;
    descriptor.bConfigurationValue = value;
    descriptor.bmAttributes = 0x80;
    descriptor.bMaxPower = 50;
    descriptor.interface = if interfaces == 0 {
        ptr::null()
    } else {
        Box::into_raw(interface_array).cast::<libusb_interface>().cast_const()
    };
    descriptor
}

/// # Safety
///
/// `config` must come from `build_config_descriptor` boxed by the mock.
unsafe fn free_config_descriptor(config: *mut libusb_config_descriptor) {
    let descriptor = unsafe { Box::from_raw(config) };
    if descriptor.interface.is_null() {
        return;
    }
    let interfaces = unsafe {
        Box::from_raw(ptr::slice_from_raw_parts_mut(
            descriptor.interface.cast_mut(),
            usize::from(descriptor.bNumInterfaces),
        ))
    };
    for interface in interfaces.iter() {
        drop(unsafe { Box::from_raw(interface.altsetting.cast_mut()) });
    }
}

/// Tracing layer counting events per level and keeping their messages
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this capture installed as the thread's subscriber
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }

    fn events(&self) -> MutexGuard<'_, Vec<(Level, String)>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self, level: Level) -> usize {
        self.events().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events().push((*event.metadata().level(), visitor.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_assigns_distinct_ids() {
        let mock = MockUsb::new();
        let a = mock.attach(MockDevice::new(1, 1));
        let b = mock.attach(MockDevice::new(1, 1));
        assert_ne!(a, b);
        assert_eq!(mock.refcount(a), 1);
        assert_eq!(mock.refcount(ptr::null_mut()), 0);
    }

    #[test]
    fn test_double_close_is_misuse() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 1));
        let mut handle = ptr::null_mut();
        unsafe {
            assert_eq!(mock.open(raw, &mut handle), 0);
            mock.close(handle);
            mock.close(handle);
        }
        assert_eq!(mock.misuse_count(), 1);
    }

    #[test]
    fn test_unref_underflow_is_misuse() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 1));
        unsafe {
            mock.unref_device(raw);
            mock.unref_device(raw);
        }
        assert_eq!(mock.refcount(raw), 0);
        assert_eq!(mock.misuse_count(), 1);
    }

    #[test]
    fn test_journal_format() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 1).interfaces(2));
        let mut handle = ptr::null_mut();
        unsafe {
            mock.open(raw, &mut handle);
            mock.claim_interface(handle, 1);
        }
        assert_eq!(
            mock.journal(),
            vec!["libusb_open()", "libusb_claim_interface(1)"]
        );
        assert_eq!(mock.native_claims(handle), vec![1]);
    }

    #[test]
    fn test_log_capture_counts_levels() {
        let capture = LogCapture::new();
        capture.in_scope(|| {
            tracing::error!("boom");
            tracing::info!("fine");
        });
        assert_eq!(capture.count(Level::ERROR), 1);
        assert_eq!(capture.messages(Level::INFO), vec!["fine".to_string()]);
    }
}
