//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file from
//! `$PURELINK_CONFIG` or the platform-appropriate directory, falls back to
//! defaults when the file does not exist yet, and turns the parsed file into
//! the device records, host overrides and manager settings the application
//! layer consumes.

pub mod config;
