//! Typed configuration for the Mnemosyne gateway.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides (`MNEMOSYNE__SECTION__KEY`)
//! - Strict validation (unknown fields are rejected)
//! - Layered configuration (defaults → file → env)
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! url = "http://127.0.0.1:8080"
//!
//! [encryption]
//! enabled = true
//! algorithm = "aes-256"
//! mode = "ctr"
//!
//! [key_management]
//! enabled = true
//! key = "<hex key>[:<hex iv>]"
//!
//! [revisions]
//! enabled = true
//!
//! [info]
//! enabled = true
//! path = "/info"
//!
//! [telemetry]
//! service_name = "mnemosyne"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = false
//! addr = "0.0.0.0:9090"
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::MnemosyneConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
