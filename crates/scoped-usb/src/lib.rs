//! Scoped ownership of libusb resources
//!
//! Every native resource the USB layer touches is owned by exactly one value
//! that gives it back on drop:
//!
//! - [`UsbContext`] exits its libusb context
//! - [`DeviceList`] frees the enumerated array and its device references
//! - [`UsbDevice`] holds one device reference
//! - [`DeviceHandle`] releases its claimed interfaces, then closes
//! - [`ConfigDescriptor`] frees the descriptor
//!
//! Native calls go through [`invoke`], which turns a negative libusb return
//! code into either a [`UsbError`] or a logged failure depending on the
//! [`CallPolicy`] configured for that kind of call. The native library itself
//! sits behind [`NativeApi`]; [`Libusb`] is the real one and
//! [`test_utils::MockUsb`] an in-process double.
//!
//! # Example
//!
//! ```no_run
//! use scoped_usb::UsbContext;
//!
//! let context = UsbContext::new()?;
//! for device in context.devices()?.devices() {
//!     let descriptor = device.device_descriptor()?;
//!     println!(
//!         "{} {:04x}:{:04x}",
//!         device.path()?,
//!         descriptor.vendor_id,
//!         descriptor.product_id
//!     );
//! }
//! # Ok::<(), scoped_usb::UsbError>(())
//! ```

pub mod context;
pub mod descriptor;
pub mod device;
pub mod device_list;
pub mod error;
pub mod handle;
pub mod invoke;
pub mod native;
pub mod scoped;
pub mod test_utils;

pub use context::UsbContext;
pub use descriptor::{ConfigDescriptor, DeviceDescriptor};
pub use device::{MAX_PORT_NUMBERS, UsbDevice};
pub use device_list::DeviceList;
pub use error::{ErrorCode, OutOfRange, SetupError, UsbError, describe_code};
pub use handle::DeviceHandle;
pub use invoke::{CallPolicy, Policies, ReturnCode, invoke};
pub use native::{Libusb, Native, NativeApi};
pub use scoped::{Disposer, Scoped};
