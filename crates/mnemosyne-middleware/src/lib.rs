//! # Mnemosyne Middleware
//!
//! Interception layers for the Mnemosyne object-storage gateway.
//!
//! Every request passes through an ordered list of [`Middleware`] stages
//! before reaching the backing store. Two stages carry the gateway's
//! features:
//!
//! - **Encryption** streams object bodies through a counter-mode cipher on
//!   the way in and out, so the store only ever holds ciphertext.
//! - **Revisions** turns every object in a versioned container into a
//!   manifest pointing at an immutable revision object.
//!
//! Stages talk to the store on the caller's behalf with sub-requests
//! ([`subrequest`]); those enter the pipeline directly downstream of the
//! issuing stage.
//!
//! ## Example
//!
//! ```ignore
//! use mnemosyne_middleware::pipeline::Pipeline;
//! use mnemosyne_middleware::stages::{EncryptionMiddleware, KeyManagementMiddleware};
//!
//! let pipeline = Pipeline::builder(HttpBackend::new("http://127.0.0.1:8080")?)
//!     .stage(KeyManagementMiddleware::with_static_key(material))
//!     .stage(EncryptionMiddleware::new("aes-256", "ctr")?)
//!     .build();
//!
//! let response = pipeline.process(request).await;
//! ```

#![doc(html_root_url = "https://docs.rs/mnemosyne-middleware/0.1.0")]
#![warn(missing_docs)]

pub mod backend;
pub mod cipher;
pub mod context;
pub mod manifest;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod subrequest;
pub mod types;

pub use backend::{Backend, HttpBackend, TransportError, TransportFailure};
pub use cipher::{CipherAlgorithm, CipherConfig, CipherError, Keystream};
pub use context::MiddlewareContext;
pub use manifest::{ContainerInfo, ContainerInfoSource, Manifest, ManifestError};
pub use middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use subrequest::{Subrequest, SubrequestBuilder, SubrequestError, SubrequestResult};
pub use types::{Body, BoxError, Request, Response, ResponseExt};
