//! Integration tests for configuration loading
//!
//! Tests file-based loading, including:
//! - Full and partial documents
//! - Explicit paths that do not exist
//! - Malformed TOML and invalid levels
//!
//! Run with: `cargo test -p common --test config_tests`

use common::{Config, Error};
use std::fs;
use tempfile::TempDir;
use tracing::Level;

const FULL_CONFIG: &str = r#"
[logging]
level = "scoped_usb=debug"
with_target = false

[calls]
failure_level = "error"
cleanup_level = "warn"
query_level = "info"
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, FULL_CONFIG);

    let config = Config::load(&path).unwrap();
    assert_eq!(config.logging.level, "scoped_usb=debug");
    assert!(!config.logging.with_target);
    assert_eq!(config.calls.failure_level().unwrap(), Level::ERROR);
    assert_eq!(config.calls.cleanup_level().unwrap(), Level::WARN);
    assert_eq!(config.calls.query_level().unwrap(), Level::INFO);
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[calls]\nquery_level = \"debug\"\n");

    let config = Config::load(&path).unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.calls.cleanup_level().unwrap(), Level::ERROR);
    assert_eq!(config.calls.query_level().unwrap(), Level::DEBUG);
}

#[test]
fn test_load_or_default_explicit_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, FULL_CONFIG);

    let config = Config::load_or_default(path.to_str()).unwrap();
    assert_eq!(config.calls.cleanup_level().unwrap(), Level::WARN);
}

#[test]
fn test_missing_explicit_path_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let err = Config::load_or_default(path.to_str()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_malformed_toml() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[logging\nlevel = ");

    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, Error::Toml(_)));
}

#[test]
fn test_empty_logging_level_rejected() {
    let err = Config::from_toml_str("[logging]\nlevel = \"  \"\n").unwrap_err();
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn test_default_path_location() {
    let path = Config::default_path();
    assert!(path.ends_with("scoped-usb/config.toml"));
}
