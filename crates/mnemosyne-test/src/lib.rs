//! # Mnemosyne Test
//!
//! Test utilities for the Mnemosyne gateway.
//!
//! - [`MemoryStore`]: an in-memory backing store with container metadata,
//!   object metadata, single byte ranges and request recording
//! - [`UnreachableStore`]: a backend whose every call fails at the
//!   transport level
//! - [`TestClient`]: drives requests through a [`Pipeline`] in process
//! - [`TestResponse`]: a fully read response with assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use mnemosyne_middleware::Pipeline;
//! use mnemosyne_middleware::stages::RevisionsMiddleware;
//! use mnemosyne_test::{MemoryStore, TestClient};
//!
//! let store = MemoryStore::new();
//! store.create_container("/v1/a/c", &[("revisions-location", "c_revs")]);
//! store.create_container("/v1/a/c_revs", &[]);
//!
//! let client = TestClient::pipeline(
//!     Pipeline::builder(store.clone())
//!         .stage(RevisionsMiddleware::new())
//!         .build(),
//! );
//!
//! client.put("/v1/a/c/o").body("v1").send().await.assert_status(StatusCode::CREATED);
//! assert_eq!(store.object_names("/v1/a/c_revs").len(), 1);
//! ```
//!
//! [`Pipeline`]: mnemosyne_middleware::Pipeline

#![doc(html_root_url = "https://docs.rs/mnemosyne-test/0.1.0")]
#![warn(missing_docs)]

mod client;
mod error;
mod response;
mod store;

pub use client::{TestClient, TestClientRequest, TestHandler};
pub use error::TestError;
pub use response::TestResponse;
pub use store::{MemoryStore, RecordedRequest, StoredObject, UnreachableStore};
