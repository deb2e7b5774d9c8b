//! Checked invocation of native calls
//!
//! Every native call that can fail goes through [`invoke`]. A negative return
//! code is logged at the policy's level and then either turned into a
//! [`UsbError`] or handed back unchanged, depending on [`CallPolicy::raise`].

use crate::error::UsbError;
use crate::native::NativeApi;
use common::CallSettings;
use std::ffi::c_int;
use std::panic::Location;
use tracing::Level;

/// How a failed native call is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Level of the failure log line
    pub level: Level,
    /// Return `Err` on failure; otherwise log and pass the code through
    pub raise: bool,
}

impl CallPolicy {
    pub const RAISE: Self = Self::new(Level::ERROR, true);
    pub const LOG_ONLY: Self = Self::new(Level::ERROR, false);

    pub const fn new(level: Level, raise: bool) -> Self {
        Self { level, raise }
    }

    pub const fn with_level(self, level: Level) -> Self {
        Self { level, ..self }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::RAISE
    }
}

/// The policies a context hands to everything derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policies {
    /// Ordinary operations
    pub call: CallPolicy,
    /// Interface release during handle teardown; never raises
    pub cleanup: CallPolicy,
    /// Non-raising query forms
    pub query: CallPolicy,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            call: CallPolicy::RAISE,
            cleanup: CallPolicy::LOG_ONLY,
            query: CallPolicy::LOG_ONLY,
        }
    }
}

impl Policies {
    pub fn from_settings(settings: &CallSettings) -> common::Result<Self> {
        Ok(Self {
            call: CallPolicy::RAISE.with_level(settings.failure_level()?),
            cleanup: CallPolicy::LOG_ONLY.with_level(settings.cleanup_level()?),
            query: CallPolicy::LOG_ONLY.with_level(settings.query_level()?),
        })
    }
}

/// Signed native return value; negative means failure
pub trait ReturnCode: Copy {
    /// The error code when the value signals failure
    fn failure(self) -> Option<c_int>;
}

impl ReturnCode for c_int {
    fn failure(self) -> Option<c_int> {
        (self < 0).then_some(self)
    }
}

impl ReturnCode for isize {
    fn failure(self) -> Option<c_int> {
        // Out-of-range failures collapse to LIBUSB_ERROR_OTHER
        (self < 0).then(|| c_int::try_from(self).unwrap_or(-99))
    }
}

/// Run `call` and check its return code
///
/// `site` names the operation of this layer making the call, `function` the
/// native function. On failure the log line carries both, the caller's source
/// location and the backend's description of the code.
#[track_caller]
pub fn invoke<B, R, F>(
    backend: &B,
    policy: CallPolicy,
    site: &'static str,
    function: &'static str,
    call: F,
) -> Result<R, UsbError>
where
    B: NativeApi,
    R: ReturnCode,
    F: FnOnce() -> R,
{
    let rc = call();
    let Some(code) = rc.failure() else {
        return Ok(rc);
    };

    let location = Location::caller();
    let description = backend.strerror(code);
    log_failure(policy.level, site, function, code, location, &description);

    if policy.raise {
        Err(UsbError::with_message(code, description))
    } else {
        Ok(rc)
    }
}

fn log_failure(
    level: Level,
    site: &str,
    function: &str,
    code: c_int,
    location: &Location<'_>,
    description: &str,
) {
    macro_rules! emit {
        ($macro:ident) => {
            tracing::$macro!(
                site,
                function,
                code,
                location = %location,
                "{} failed {}(): {}",
                site,
                function,
                description
            )
        };
    }

    if level == Level::ERROR {
        emit!(error);
    } else if level == Level::WARN {
        emit!(warn);
    } else if level == Level::INFO {
        emit!(info);
    } else if level == Level::DEBUG {
        emit!(debug);
    } else {
        emit!(trace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{LogCapture, MockUsb};

    #[test]
    fn test_success_passes_value_through() {
        let mock = MockUsb::new();
        let rc = invoke(&mock, CallPolicy::RAISE, "test", "libusb_fake", || 7).unwrap();
        assert_eq!(rc, 7);
    }

    #[test]
    fn test_failure_raises_with_code() {
        let mock = MockUsb::new();
        let err = invoke(&mock, CallPolicy::RAISE, "test", "libusb_fake", || -6).unwrap_err();
        assert_eq!(err.code(), -6);
        assert_eq!(err.message(), "Resource busy");
    }

    #[test]
    fn test_log_only_returns_negative_code() {
        let mock = MockUsb::new();
        let rc = invoke(&mock, CallPolicy::LOG_ONLY, "test", "libusb_fake", || -4).unwrap();
        assert_eq!(rc, -4);
    }

    #[test]
    fn test_failure_logged_at_policy_level() {
        let mock = MockUsb::new();
        let capture = LogCapture::new();
        capture.in_scope(|| {
            let policy = CallPolicy::LOG_ONLY.with_level(Level::WARN);
            let _ = invoke(&mock, policy, "test", "libusb_fake", || -1);
            let _ = invoke(&mock, CallPolicy::RAISE, "test", "libusb_fake", || 0);
        });
        assert_eq!(capture.count(Level::WARN), 1);
        assert_eq!(capture.count(Level::ERROR), 0);
    }

    #[test]
    fn test_isize_failure_code() {
        assert_eq!((-5isize).failure(), Some(-5));
        assert_eq!(3isize.failure(), None);
        assert_eq!(isize::MIN.failure(), Some(-99));
    }

    #[test]
    fn test_policies_from_settings() {
        let settings = CallSettings {
            failure_level: "warn".to_string(),
            cleanup_level: "debug".to_string(),
            query_level: "info".to_string(),
        };
        let policies = Policies::from_settings(&settings).unwrap();
        assert_eq!(policies.call, CallPolicy::new(Level::WARN, true));
        assert_eq!(policies.cleanup, CallPolicy::new(Level::DEBUG, false));
        assert_eq!(policies.query, CallPolicy::new(Level::INFO, false));
    }
}
