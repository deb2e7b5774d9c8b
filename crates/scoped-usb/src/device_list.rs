//! Read-only view over an enumerated device array
//!
//! The list owns the array from `libusb_get_device_list` together with one
//! reference per entry, and gives both back in a single
//! `libusb_free_device_list(list, 1)` on drop. Devices wrapped through
//! [`DeviceList::device`] take their own reference and outlive the list.

use crate::context::UsbContext;
use crate::device::UsbDevice;
use crate::error::{OutOfRange, UsbError};
use crate::invoke::invoke;
use crate::native::{Libusb, Native, NativeApi, libusb_device};
use std::ops::Index;
use std::{iter, ptr, slice};
use tracing::debug;

pub struct DeviceList<B: NativeApi = Libusb> {
    native: Native<B>,
    list: *const *mut libusb_device,
    len: usize,
}

impl<B: NativeApi> DeviceList<B> {
    /// Enumerate the devices of `context`
    ///
    /// Either the whole list is returned or an error; there is no partial list.
    pub fn new(context: &UsbContext<B>) -> Result<Self, UsbError> {
        let native = context.native().clone();
        let mut list = ptr::null();
        let count = invoke(
            native.backend(),
            native.policies().call,
            "DeviceList::new",
            "libusb_get_device_list",
            // SAFETY: the context is live and `list` is a valid out-parameter.
            || unsafe { native.backend().get_device_list(context.as_raw(), &mut list) },
        )?;

        debug!("Enumerated {} USB devices", count);
        Ok(Self {
            native,
            list,
            len: count as usize,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[*mut libusb_device] {
        if self.list.is_null() || self.len == 0 {
            return &[];
        }
        // SAFETY: libusb hands back `len` valid entries that stay alive until
        // the list is freed in `drop`.
        unsafe { slice::from_raw_parts(self.list, self.len) }
    }

    pub fn get(&self, index: usize) -> Option<*mut libusb_device> {
        self.as_slice().get(index).copied()
    }

    /// Bounds-checked access
    pub fn at(&self, index: usize) -> Result<*mut libusb_device, OutOfRange> {
        self.get(index).ok_or(OutOfRange {
            index,
            len: self.len,
        })
    }

    /// # Safety
    ///
    /// `index` must be less than [`DeviceList::len`].
    pub unsafe fn get_unchecked(&self, index: usize) -> *mut libusb_device {
        unsafe { *self.as_slice().get_unchecked(index) }
    }

    pub fn first(&self) -> Option<*mut libusb_device> {
        self.as_slice().first().copied()
    }

    pub fn last(&self) -> Option<*mut libusb_device> {
        self.as_slice().last().copied()
    }

    /// Raw entries in enumeration order; `.rev()` walks them backwards
    pub fn iter(&self) -> iter::Copied<slice::Iter<'_, *mut libusb_device>> {
        self.as_slice().iter().copied()
    }

    /// Wrap entry `index` as a [`UsbDevice`] holding its own reference
    pub fn device(&self, index: usize) -> Option<UsbDevice<B>> {
        // SAFETY: entries are live devices for as long as the list is.
        self.get(index)
            .map(|raw| unsafe { UsbDevice::from_raw(self.native.clone(), raw) })
    }

    pub fn devices(&self) -> impl DoubleEndedIterator<Item = UsbDevice<B>> + '_ {
        // SAFETY: as in `device`.
        self.iter()
            .map(|raw| unsafe { UsbDevice::from_raw(self.native.clone(), raw) })
    }

    /// First device whose [`UsbDevice::path`] equals `path`
    ///
    /// Devices whose path cannot be read are skipped.
    pub fn find_by_path(&self, path: &str) -> Option<UsbDevice<B>> {
        self.devices()
            .find(|device| device.path().is_ok_and(|candidate| candidate == path))
    }
}

impl<B: NativeApi> Index<usize> for DeviceList<B> {
    type Output = *mut libusb_device;

    fn index(&self, index: usize) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl<'a, B: NativeApi> IntoIterator for &'a DeviceList<B> {
    type Item = *mut libusb_device;
    type IntoIter = iter::Copied<slice::Iter<'a, *mut libusb_device>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<B: NativeApi> Drop for DeviceList<B> {
    fn drop(&mut self) {
        if !self.list.is_null() {
            // SAFETY: the list came from libusb_get_device_list and is freed once.
            unsafe { self.native.backend().free_device_list(self.list, 1) };
        }
    }
}

impl<B: NativeApi> std::fmt::Debug for DeviceList<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDevice, MockUsb};

    #[test]
    fn test_empty_enumeration() {
        let mock = MockUsb::new();
        let context = UsbContext::with_backend(mock.clone()).unwrap();
        let list = context.devices().unwrap();
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert_eq!(list.at(0), Err(OutOfRange { index: 0, len: 0 }));
        assert!(list.first().is_none());
        assert!(list.last().is_none());
    }

    #[test]
    fn test_enumeration_failure() {
        let mock = MockUsb::new();
        mock.attach(MockDevice::new(0x1234, 0x5678));
        mock.fail("libusb_get_device_list", -1);
        let context = UsbContext::with_backend(mock.clone()).unwrap();
        let err = context.devices().unwrap_err();
        assert_eq!(err.code(), -1);
        assert_eq!(mock.count_calls("libusb_free_device_list"), 0);
    }

    #[test]
    fn test_iteration_order() {
        let mock = MockUsb::new();
        let a = mock.attach(MockDevice::new(1, 1));
        let b = mock.attach(MockDevice::new(2, 2));
        let c = mock.attach(MockDevice::new(3, 3));
        let context = UsbContext::with_backend(mock.clone()).unwrap();
        let list = context.devices().unwrap();

        assert_eq!(list.iter().collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(list.iter().rev().collect::<Vec<_>>(), vec![c, b, a]);
        assert_eq!(list.first(), Some(a));
        assert_eq!(list.last(), Some(c));
        assert_eq!(list[1], b);
        assert_eq!(unsafe { list.get_unchecked(2) }, c);
        assert_eq!(list.at(3), Err(OutOfRange { index: 3, len: 3 }));
    }

    #[test]
    fn test_drop_returns_list_references() {
        let mock = MockUsb::new();
        let raw = mock.attach(MockDevice::new(1, 1));
        let context = UsbContext::with_backend(mock.clone()).unwrap();
        let before = mock.refcount(raw);

        let list = context.devices().unwrap();
        assert_eq!(mock.refcount(raw), before + 1);
        drop(list);
        assert_eq!(mock.refcount(raw), before);
        assert_eq!(mock.count_calls("libusb_free_device_list"), 1);
        assert_eq!(mock.misuse_count(), 0);
    }

    #[test]
    fn test_find_by_path() {
        let mock = MockUsb::new();
        mock.attach(MockDevice::new(1, 1).bus(1).ports(&[2]));
        let wanted = mock.attach(MockDevice::new(2, 2).bus(3).ports(&[1, 4]));
        let context = UsbContext::with_backend(mock.clone()).unwrap();
        let list = context.devices().unwrap();

        let found = list.find_by_path("3.1.4").unwrap();
        assert_eq!(found.as_raw(), wanted);
        assert!(list.find_by_path("9.9").is_none());
    }
}
