//! Device and configuration descriptors

use crate::native::{Libusb, Native, NativeApi, libusb_config_descriptor, libusb_device_descriptor};
use crate::scoped::{Disposer, Scoped};
use std::ptr::NonNull;
use std::slice;

/// Owned copy of a device descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub usb_version: u16,
    pub class_code: u8,
    pub sub_class_code: u8,
    pub protocol_code: u8,
    pub max_packet_size: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version: u16,
    pub manufacturer_string_index: u8,
    pub product_string_index: u8,
    pub serial_number_string_index: u8,
    pub num_configurations: u8,
}

impl From<&libusb_device_descriptor> for DeviceDescriptor {
    fn from(raw: &libusb_device_descriptor) -> Self {
        Self {
            usb_version: raw.bcdUSB,
            class_code: raw.bDeviceClass,
            sub_class_code: raw.bDeviceSubClass,
            protocol_code: raw.bDeviceProtocol,
            max_packet_size: raw.bMaxPacketSize0,
            vendor_id: raw.idVendor,
            product_id: raw.idProduct,
            device_version: raw.bcdDevice,
            manufacturer_string_index: raw.iManufacturer,
            product_string_index: raw.iProduct,
            serial_number_string_index: raw.iSerialNumber,
            num_configurations: raw.bNumConfigurations,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigDescriptorFree<B: NativeApi> {
    native: Native<B>,
}

impl<B: NativeApi> Disposer for ConfigDescriptorFree<B> {
    type Target = libusb_config_descriptor;

    fn dispose(&mut self, raw: NonNull<libusb_config_descriptor>) {
        // SAFETY: the descriptor is owned and came from libusb_get_config_descriptor.
        unsafe { self.native.backend().free_config_descriptor(raw.as_ptr()) };
    }
}

/// One configuration descriptor of a device, freed on drop
///
/// Produced by [`crate::UsbDevice::config_descriptor`]. The accessors return
/// zero for an empty descriptor.
#[derive(Debug)]
pub struct ConfigDescriptor<B: NativeApi = Libusb> {
    inner: Scoped<ConfigDescriptorFree<B>>,
}

// SAFETY: the descriptor is plain immutable data owned by this value.
unsafe impl<B: NativeApi + Send> Send for ConfigDescriptor<B> {}

impl<B: NativeApi> ConfigDescriptor<B> {
    pub fn empty(native: Native<B>) -> Self {
        Self {
            inner: Scoped::empty(ConfigDescriptorFree { native }),
        }
    }

    /// # Safety
    ///
    /// `raw` must be null or come from `libusb_get_config_descriptor` and not
    /// be freed by anyone else.
    pub unsafe fn from_raw(native: Native<B>, raw: *const libusb_config_descriptor) -> Self {
        Self {
            inner: unsafe { Scoped::from_raw(raw.cast_mut(), ConfigDescriptorFree { native }) },
        }
    }

    pub fn as_raw(&self) -> *const libusb_config_descriptor {
        self.inner.as_ptr()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The native descriptor, borrowed for as long as this value owns it
    pub fn raw_descriptor(&self) -> Option<&libusb_config_descriptor> {
        // SAFETY: the owned descriptor stays valid and unaliased-mutably until
        // it is freed, which needs `&mut self`.
        self.inner.get().map(|raw| unsafe { raw.as_ref() })
    }

    pub fn configuration_value(&self) -> u8 {
        self.raw_descriptor().map_or(0, |d| d.bConfigurationValue)
    }

    pub fn num_interfaces(&self) -> u8 {
        self.raw_descriptor().map_or(0, |d| d.bNumInterfaces)
    }

    pub fn attributes(&self) -> u8 {
        self.raw_descriptor().map_or(0, |d| d.bmAttributes)
    }

    pub fn max_power(&self) -> u8 {
        self.raw_descriptor().map_or(0, |d| d.bMaxPower)
    }

    pub fn total_length(&self) -> u16 {
        self.raw_descriptor().map_or(0, |d| d.wTotalLength)
    }

    /// Interface numbers, taken from each interface's first alternate setting
    pub fn interface_numbers(&self) -> Vec<u8> {
        let Some(descriptor) = self.raw_descriptor() else {
            return Vec::new();
        };
        if descriptor.interface.is_null() || descriptor.bNumInterfaces == 0 {
            return Vec::new();
        }

        // SAFETY: libusb allocates `bNumInterfaces` interfaces alongside the
        // descriptor.
        let interfaces =
            unsafe { slice::from_raw_parts(descriptor.interface, descriptor.bNumInterfaces.into()) };
        interfaces
            .iter()
            .filter(|interface| !interface.altsetting.is_null() && interface.num_altsetting > 0)
            // SAFETY: checked non-null with at least one alternate setting.
            .map(|interface| unsafe { (*interface.altsetting).bInterfaceNumber })
            .collect()
    }

    /// Free the owned descriptor now
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[must_use = "the released descriptor leaks unless libusb_free_config_descriptor is called"]
    pub fn release(&mut self) -> Option<NonNull<libusb_config_descriptor>> {
        self.inner.release()
    }
}
