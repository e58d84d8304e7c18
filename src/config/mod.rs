//! Configuration model for pushlock.
//!
//! This module defines the Config struct that represents `.pushlock.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::ConflictStrategy;

/// Config file name looked up at the repository root.
pub const CONFIG_FILE_NAME: &str = ".pushlock.yaml";
