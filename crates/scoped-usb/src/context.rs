//! Library context, root of the resource graph

use crate::device_list::DeviceList;
use crate::error::{SetupError, UsbError};
use crate::invoke::{Policies, invoke};
use crate::native::{Libusb, Native, NativeApi, libusb_context};
use crate::scoped::{Disposer, Scoped};
use common::CallSettings;
use std::ptr::{self, NonNull};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ContextExit<B: NativeApi> {
    native: Native<B>,
}

impl<B: NativeApi> Disposer for ContextExit<B> {
    type Target = libusb_context;

    fn dispose(&mut self, raw: NonNull<libusb_context>) {
        // SAFETY: the context is owned and no longer referenced by this layer.
        unsafe { self.native.backend().exit(raw.as_ptr()) };
        debug!("Closed USB context {:p}", raw);
    }
}

/// An initialised library context, torn down on drop
///
/// Lists, devices and handles derived from a context must be dropped before
/// it; this is not checked.
#[derive(Debug)]
pub struct UsbContext<B: NativeApi = Libusb> {
    inner: Scoped<ContextExit<B>>,
}

// SAFETY: libusb contexts are internally synchronised.
unsafe impl<B: NativeApi + Send> Send for UsbContext<B> {}
unsafe impl<B: NativeApi + Sync> Sync for UsbContext<B> {}

impl UsbContext<Libusb> {
    /// Initialise the system libusb with default policies
    pub fn new() -> Result<Self, UsbError> {
        Self::with_backend(Libusb)
    }
}

impl<B: NativeApi> UsbContext<B> {
    pub fn with_backend(backend: B) -> Result<Self, UsbError> {
        Self::from_native(Native::new(backend))
    }

    pub fn with_policies(backend: B, policies: Policies) -> Result<Self, UsbError> {
        Self::from_native(Native::with_policies(backend, policies))
    }

    /// Initialise with the log levels from a `[calls]` config section
    pub fn with_settings(backend: B, settings: &CallSettings) -> Result<Self, SetupError> {
        let policies = Policies::from_settings(settings)?;
        Ok(Self::with_policies(backend, policies)?)
    }

    pub fn from_native(native: Native<B>) -> Result<Self, UsbError> {
        let mut raw = ptr::null_mut();
        invoke(
            native.backend(),
            native.policies().call,
            "UsbContext::new",
            "libusb_init",
            // SAFETY: `raw` is a valid out-parameter.
            || unsafe { native.backend().init(&mut raw) },
        )?;
        debug!("Initialised USB context {:p}", raw);
        // SAFETY: libusb_init succeeded, so `raw` is a fresh context we own.
        Ok(unsafe { Self::from_raw(native, raw) })
    }

    /// An empty context; calls made through it use libusb's default context
    pub fn empty(native: Native<B>) -> Self {
        Self {
            inner: Scoped::empty(ContextExit { native }),
        }
    }

    /// Adopt a context from `libusb_init`
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live context nobody else will exit.
    pub unsafe fn from_raw(native: Native<B>, raw: *mut libusb_context) -> Self {
        Self {
            inner: unsafe { Scoped::from_raw(raw, ContextExit { native }) },
        }
    }

    pub fn as_raw(&self) -> *mut libusb_context {
        self.inner.as_ptr()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn native(&self) -> &Native<B> {
        &self.inner.disposer().native
    }

    /// Enumerate the connected devices
    pub fn devices(&self) -> Result<DeviceList<B>, UsbError> {
        DeviceList::new(self)
    }

    /// Exit the owned context and adopt `raw`
    ///
    /// # Safety
    ///
    /// Same contract as [`UsbContext::from_raw`].
    pub unsafe fn reset(&mut self, raw: *mut libusb_context) {
        unsafe { self.inner.reset(raw) }
    }

    /// Give up the context without exiting it
    #[must_use = "the released context leaks unless libusb_exit is called"]
    pub fn release(&mut self) -> Option<NonNull<libusb_context>> {
        self.inner.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockUsb;

    #[test]
    fn test_context_exits_once() {
        let mock = MockUsb::new();
        let context = UsbContext::with_backend(mock.clone()).unwrap();
        assert_eq!(mock.live_contexts(), 1);
        drop(context);
        assert_eq!(mock.live_contexts(), 0);
        assert_eq!(mock.count_calls("libusb_exit"), 1);
        assert_eq!(mock.misuse_count(), 0);
    }

    #[test]
    fn test_init_failure_returns_no_context() {
        let mock = MockUsb::new();
        mock.fail("libusb_init", -11);
        let err = UsbContext::with_backend(mock.clone()).unwrap_err();
        assert_eq!(err.code(), -11);
        assert_eq!(mock.count_calls("libusb_exit"), 0);
    }

    #[test]
    fn test_released_context_not_exited() {
        let mock = MockUsb::new();
        let mut context = UsbContext::with_backend(mock.clone()).unwrap();
        let raw = context.release().unwrap();
        drop(context);
        assert_eq!(mock.count_calls("libusb_exit"), 0);
        unsafe { mock.exit(raw.as_ptr()) };
        assert_eq!(mock.live_contexts(), 0);
        assert_eq!(mock.misuse_count(), 0);
    }

    #[test]
    fn test_with_settings_applies_levels() {
        let settings = CallSettings {
            cleanup_level: "warn".to_string(),
            ..CallSettings::default()
        };
        let context = UsbContext::with_settings(MockUsb::new(), &settings).unwrap();
        assert_eq!(context.native().policies().cleanup.level, tracing::Level::WARN);
        assert!(!context.native().policies().cleanup.raise);
    }

    #[test]
    fn test_with_settings_keeps_init_code() {
        let mock = MockUsb::new();
        mock.fail("libusb_init", -3);
        let err = UsbContext::with_settings(mock, &CallSettings::default()).unwrap_err();
        match err {
            SetupError::Usb(usb) => assert_eq!(usb.kind(), crate::ErrorCode::Access),
            other => panic!("expected a libusb error, got {:?}", other),
        }
    }

    #[test]
    fn test_with_settings_rejects_bad_level() {
        let settings = CallSettings {
            query_level: "loud".to_string(),
            ..CallSettings::default()
        };
        let err = UsbContext::with_settings(MockUsb::new(), &settings).unwrap_err();
        assert!(matches!(err, SetupError::Config(_)));
    }
}
