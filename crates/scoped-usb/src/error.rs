//! Error types for the USB layer
//!
//! [`UsbError`] is the one error every failed native call turns into. It keeps
//! the raw libusb code so callers can branch on [`UsbError::kind`] or
//! [`UsbError::code`] without parsing the message.

use std::ffi::c_int;
use thiserror::Error;

/// libusb error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Io = -1,
    InvalidParam = -2,
    Access = -3,
    NoDevice = -4,
    NotFound = -5,
    Busy = -6,
    Timeout = -7,
    Overflow = -8,
    Pipe = -9,
    Interrupted = -10,
    NoMem = -11,
    NotSupported = -12,
    Other = -99,
}

impl ErrorCode {
    /// Map a native return code onto a known code; anything unrecognised is `Other`
    pub fn from_code(code: c_int) -> Self {
        match code {
            -1 => Self::Io,
            -2 => Self::InvalidParam,
            -3 => Self::Access,
            -4 => Self::NoDevice,
            -5 => Self::NotFound,
            -6 => Self::Busy,
            -7 => Self::Timeout,
            -8 => Self::Overflow,
            -9 => Self::Pipe,
            -10 => Self::Interrupted,
            -11 => Self::NoMem,
            -12 => Self::NotSupported,
            _ => Self::Other,
        }
    }

    pub fn code(self) -> c_int {
        self as c_int
    }

    /// Same wording as `libusb_strerror` in the English locale
    pub fn describe(self) -> &'static str {
        match self {
            Self::Io => "Input/Output Error",
            Self::InvalidParam => "Invalid parameter",
            Self::Access => "Access denied (insufficient permissions)",
            Self::NoDevice => "No such device (it may have been disconnected)",
            Self::NotFound => "Entity not found",
            Self::Busy => "Resource busy",
            Self::Timeout => "Operation timed out",
            Self::Overflow => "Overflow",
            Self::Pipe => "Pipe error",
            Self::Interrupted => "System call interrupted (perhaps due to signal)",
            Self::NoMem => "Insufficient memory",
            Self::NotSupported => "Operation not supported or unimplemented on this platform",
            Self::Other => "Other error",
        }
    }
}

/// Text for any native return code, including codes outside the known set
pub fn describe_code(code: c_int) -> &'static str {
    match code {
        0 => "Success",
        -12..=-1 | -99 => ErrorCode::from_code(code).describe(),
        _ => "Unknown error",
    }
}

/// A failed native call: the libusb code plus its description
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (libusb error {code})")]
pub struct UsbError {
    code: c_int,
    message: String,
}

impl UsbError {
    /// Build from a native code, describing it with the built-in libusb wording
    pub fn new(code: c_int) -> Self {
        Self {
            code,
            message: describe_code(code).to_string(),
        }
    }

    pub fn with_message(code: c_int, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> c_int {
        self.code
    }

    pub fn kind(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorCode> for UsbError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code.code())
    }
}

impl From<UsbError> for rusb::Error {
    fn from(err: UsbError) -> Self {
        match err.kind() {
            ErrorCode::Io => rusb::Error::Io,
            ErrorCode::InvalidParam => rusb::Error::InvalidParam,
            ErrorCode::Access => rusb::Error::Access,
            ErrorCode::NoDevice => rusb::Error::NoDevice,
            ErrorCode::NotFound => rusb::Error::NotFound,
            ErrorCode::Busy => rusb::Error::Busy,
            ErrorCode::Timeout => rusb::Error::Timeout,
            ErrorCode::Overflow => rusb::Error::Overflow,
            ErrorCode::Pipe => rusb::Error::Pipe,
            ErrorCode::Interrupted => rusb::Error::Interrupted,
            ErrorCode::NoMem => rusb::Error::NoMem,
            ErrorCode::NotSupported => rusb::Error::NotSupported,
            ErrorCode::Other => rusb::Error::Other,
        }
    }
}

/// Bounds-checked device list access past the end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Device list index {index} out of range (size {len})")]
pub struct OutOfRange {
    pub index: usize,
    pub len: usize,
}

/// Failure while building a context from configuration
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] common::Error),

    #[error(transparent)]
    Usb(#[from] UsbError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_keeps_code() {
        let err = UsbError::new(-3);
        assert_eq!(err.code(), -3);
        assert_eq!(err.kind(), ErrorCode::Access);
        assert!(!err.message().is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = UsbError::with_message(-5, "nothing there");
        let msg = format!("{}", err);
        assert!(msg.contains("nothing there"));
        assert!(msg.contains("-5"));
    }

    #[test]
    fn test_unknown_code_is_other() {
        assert_eq!(ErrorCode::from_code(-42), ErrorCode::Other);
        assert_eq!(describe_code(-42), "Unknown error");
        assert_eq!(UsbError::new(-42).code(), -42);
    }

    #[test]
    fn test_rusb_conversion() {
        let err: rusb::Error = UsbError::new(-4).into();
        assert_eq!(err, rusb::Error::NoDevice);
        let err: rusb::Error = UsbError::from(ErrorCode::Busy).into();
        assert_eq!(err, rusb::Error::Busy);
    }
}
