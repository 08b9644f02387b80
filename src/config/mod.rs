//! Configuration module for Otto.
//!
//! Data models plus loading, validation and schema helpers.
//!
//! Example:
//! use otto::config::{Config, load_from_path};
//!
//! let cfg = load_from_path("otto.json")?;

pub mod loader;
pub mod models;

pub use models::{Backend, Config, KeyOverrides};

pub use loader::{
    ConfigError, generate_schema, load_from_path, load_from_path_async, load_from_reader,
    load_from_str, validate_config, write_schema_to_writer,
};
