//! # Mnemosyne Core
//!
//! Core types shared by the Mnemosyne interception layers.
//!
//! This crate provides the foundational types used throughout Mnemosyne:
//!
//! - [`ObjectPath`] - Parsed `/version/account/container/object` request path
//! - [`KeyMaterial`] - Key (and optional IV) handed out by key management
//! - [`GatewayError`] - Error taxonomy and its HTTP status mapping
//! - [`RequestId`] - UUID v7 identifier used to correlate sub-requests in logs
//! - [`headers`] - Reserved header and metadata names

#![doc(html_root_url = "https://docs.rs/mnemosyne-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod headers;
mod key;
mod path;

pub use context::RequestId;
pub use error::{ErrorCategory, GatewayError, GatewayResult};
pub use key::{KeyFormatError, KeyMaterial};
pub use path::ObjectPath;
