//! Common utilities for scoped-usb
//!
//! This crate provides the ambient pieces shared by the USB layer and the
//! programs embedding it: configuration file loading, logging setup, and the
//! error type for both.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CallSettings, Config, LoggingSettings};
pub use error::{Error, Result};
pub use logging::setup_logging;
