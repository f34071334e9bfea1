//! Interception stages.
//!
//! Stages are listed in the order [`crate::pipeline::Pipeline`] expects them:
//!
//! 1. [`info`] - capability discovery at `GET /info`
//! 2. [`key_management`] - publishes the per-request key source
//! 3. [`revisions`] - manifest indirection for versioned containers
//! 4. [`encryption`] - at-rest encryption of object bodies

pub mod encryption;
pub mod info;
pub mod key_management;
pub mod revisions;

pub use encryption::EncryptionMiddleware;
pub use info::InfoMiddleware;
pub use key_management::{EncryptionParams, KeyManagementMiddleware, KeySource, StaticKeySource};
pub use revisions::{RevisionsMiddleware, RevisionsMiddlewareBuilder};
