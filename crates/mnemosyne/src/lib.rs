//! # Mnemosyne
//!
//! **Encrypting and versioning interception layers for an object-storage gateway**
//!
//! Mnemosyne sits between clients and an object store and adds two features
//! the store does not have:
//!
//! - **At-rest encryption**: object bodies are encrypted with a
//!   counter-mode cipher while they stream to the store and decrypted while
//!   they stream back, including single byte-range reads.
//! - **Versioning**: in a container whose metadata names a revisions
//!   container, every write becomes an immutable revision object and the
//!   visible object becomes a manifest pointing at the current one.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mnemosyne::prelude::*;
//!
//! let config = ConfigLoader::new()
//!     .with_optional_file("mnemosyne.toml")?
//!     .with_env_prefix("MNEMOSYNE")
//!     .load()?;
//!
//! mnemosyne::telemetry::init_telemetry(&config.telemetry.to_telemetry_config())?;
//! let gateway = Gateway::from_config(&config)?;
//!
//! let response = gateway.handle(request).await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Info → KeyManagement → Revisions → Encryption → Backing store
//!                                      │             ▲
//!                                      └ sub-requests┘
//! ```
//!
//! Sub-requests issued by the revisions stage enter the pipeline directly
//! below it, so revision objects are encrypted like any other object.

#![doc(html_root_url = "https://docs.rs/mnemosyne/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod gateway;

pub use gateway::{Gateway, GatewayBuilder};

// Re-export core types
pub use mnemosyne_core as core;

// Re-export middleware types
pub use mnemosyne_middleware as middleware;

// Re-export configuration types
pub use mnemosyne_config as config;

// Re-export telemetry types
pub use mnemosyne_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use mnemosyne::prelude::*;
/// ```
pub mod prelude {
    pub use crate::gateway::{Gateway, GatewayBuilder};

    pub use mnemosyne_core::{GatewayError, GatewayResult, KeyMaterial, ObjectPath, RequestId};

    pub use mnemosyne_config::{ConfigError, ConfigLoader, MnemosyneConfig};

    pub use mnemosyne_middleware::stages::{
        EncryptionMiddleware, InfoMiddleware, KeyManagementMiddleware, RevisionsMiddleware,
    };
    pub use mnemosyne_middleware::{
        Backend, HttpBackend, Middleware, MiddlewareContext, Next, Pipeline, Request, Response,
        ResponseExt,
    };
}
