//! Manifest indirection protocol.
//!
//! A versioned object is stored as a manifest (the primary object) whose
//! [`REVISION_POINTER`] metadata names the current revision, plus one
//! revision object per write inside the revisions container:
//!
//! ```text
//! /v1/a/c/o            X-Object-Meta-Revision-Reference: o.1700000000.000001
//! /v1/a/revs/o.1700000000.000001   (data + user metadata)
//! /v1/a/revs/o.1699999000.123456   (superseded, kept)
//! ```
//!
//! A write is two sub-requests: the revision PUT, then the pointer update.
//! They are not atomic. A crash or a concurrent writer between the two can
//! leave the pointer on an older revision while a newer revision object
//! exists; that revision is orphaned, not lost. Concurrent pointer updates
//! resolve as last writer wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use mnemosyne_core::headers::{CONTAINER_META_PREFIX, REVISIONS_LOCATION, REVISION_POINTER};
use mnemosyne_core::{GatewayError, ObjectPath};
use thiserror::Error;

use crate::context::MiddlewareContext;
use crate::middleware::BoxFuture;
use crate::subrequest::{Subrequest, SubrequestBuilder, SubrequestError, SubrequestResult};
use crate::types::Body;

/// Errors raised by the manifest protocol.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The container metadata lookup returned a non-success status.
    #[error("container lookup returned {0}")]
    ContainerLookup(StatusCode),

    /// Reading the manifest returned a non-success status.
    #[error("manifest read returned {0}")]
    ManifestRead(StatusCode),

    /// The manifest exists but carries no revision pointer.
    #[error("manifest {path} has no revision pointer")]
    MissingPointer {
        /// Path of the primary object.
        path: String,
    },

    /// A sub-request failed outright.
    #[error(transparent)]
    Subrequest(#[from] SubrequestError),
}

impl From<ManifestError> for GatewayError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::ContainerLookup(status) | ManifestError::ManifestRead(status) => {
                Self::upstream(status)
            }
            ManifestError::MissingPointer { .. } => Self::precondition_failed(err.to_string()),
            ManifestError::Subrequest(sub) => sub.into(),
        }
    }
}

/// Status and metadata of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Status of the lookup.
    pub status: StatusCode,
    /// Container metadata, keyed by lowercase name without the
    /// `x-container-meta-` prefix.
    pub meta: HashMap<String, String>,
}

impl ContainerInfo {
    /// Builds container info from the headers of a container HEAD.
    pub fn from_headers(status: StatusCode, headers: &HeaderMap) -> Self {
        let meta = headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix(CONTAINER_META_PREFIX)?;
                let value = value.to_str().ok()?;
                Some((key.to_string(), value.to_string()))
            })
            .collect();
        Self { status, meta }
    }

    /// Returns the revisions container name, if the container is versioned.
    pub fn revisions_location(&self) -> Option<&str> {
        self.meta
            .get(REVISIONS_LOCATION)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Looks up a container's status and metadata.
pub trait ContainerInfoSource: Send + Sync + 'static {
    /// Returns the info for the container at `container_path`.
    ///
    /// `headers` are the original request headers; `sub` dispatches into the
    /// pipeline below the revisions stage.
    fn container_info<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        container_path: &'a str,
        headers: &'a HeaderMap,
        sub: Subrequest<'a>,
    ) -> BoxFuture<'a, Result<ContainerInfo, SubrequestError>>;
}

/// Container lookup that issues a HEAD on the container with the caller's
/// credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadContainerInfo;

impl ContainerInfoSource for HeadContainerInfo {
    fn container_info<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        container_path: &'a str,
        headers: &'a HeaderMap,
        sub: Subrequest<'a>,
    ) -> BoxFuture<'a, Result<ContainerInfo, SubrequestError>> {
        Box::pin(async move {
            let result = sub
                .execute(
                    ctx,
                    SubrequestBuilder::new(Method::HEAD, container_path, headers),
                )
                .await?;
            Ok(ContainerInfo::from_headers(result.status, &result.headers))
        })
    }
}

/// Source of revision timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Returns the system clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Builds a revision name: `<object>.<seconds>.<microseconds>`.
pub fn revision_name(object: &str, at: DateTime<Utc>) -> String {
    format!(
        "{object}.{}.{:06}",
        at.timestamp(),
        at.timestamp_subsec_micros()
    )
}

/// One versioned object, bound to the request that addresses it.
pub struct Manifest<'a> {
    sub: Subrequest<'a>,
    primary: &'a ObjectPath,
    revisions: &'a str,
    headers: &'a HeaderMap,
}

impl<'a> Manifest<'a> {
    /// Binds the protocol to `primary`, whose revisions live in the
    /// container named `revisions`.
    pub fn new(
        sub: Subrequest<'a>,
        primary: &'a ObjectPath,
        revisions: &'a str,
        headers: &'a HeaderMap,
    ) -> Self {
        Self {
            sub,
            primary,
            revisions,
            headers,
        }
    }

    /// Returns the path of the named revision object.
    ///
    /// The name is opaque: it is percent-encoded into the path, never
    /// spliced in as URI text.
    pub fn revision_path(&self, revision: &str) -> ObjectPath {
        self.primary.sibling(self.revisions, revision)
    }

    /// Reads the manifest and returns the current revision name.
    pub async fn current_revision(
        &self,
        ctx: &mut MiddlewareContext,
    ) -> Result<String, ManifestError> {
        let primary = self.primary.to_string();
        let result = self
            .sub
            .execute(
                ctx,
                SubrequestBuilder::new(Method::HEAD, primary.as_str(), self.headers),
            )
            .await?;

        if !result.is_success() {
            metrics::counter!("mnemosyne_manifest_lookups_total", "outcome" => "error")
                .increment(1);
            return Err(ManifestError::ManifestRead(result.status));
        }

        let Some(revision) = result
            .header(REVISION_POINTER)
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            metrics::counter!("mnemosyne_manifest_lookups_total", "outcome" => "missing")
                .increment(1);
            return Err(ManifestError::MissingPointer { path: primary });
        };

        metrics::counter!("mnemosyne_manifest_lookups_total", "outcome" => "found").increment(1);
        tracing::info!(
            request_id = %ctx.request_id(),
            revision = revision,
            "Retrieved manifest: {} -> {}/{}",
            primary,
            self.revisions,
            revision
        );
        Ok(revision.to_string())
    }

    /// Writes a new revision object carrying the original request's headers
    /// and body.
    pub async fn write_revision(
        &self,
        ctx: &mut MiddlewareContext,
        revision: &str,
        body: Body,
    ) -> Result<SubrequestResult, ManifestError> {
        let path = self.revision_path(revision).to_string();
        let builder = SubrequestBuilder::from_original(Method::PUT, path, self.headers).body(body);
        Ok(self.sub.execute(ctx, builder).await?)
    }

    /// Points the manifest at `revision` with a metadata-only write.
    pub async fn update_pointer(
        &self,
        ctx: &mut MiddlewareContext,
        revision: &str,
    ) -> Result<SubrequestResult, ManifestError> {
        let value = HeaderValue::from_str(revision).map_err(|e| {
            SubrequestError::Invalid(format!("revision name {revision:?}: {e}"))
        })?;
        let builder =
            SubrequestBuilder::new(Method::PUT, self.primary.to_string(), self.headers)
                .header(HeaderName::from_static(REVISION_POINTER), value)
                .no_body();
        let result = self.sub.execute(ctx, builder).await?;

        if result.is_success() {
            tracing::info!(
                request_id = %ctx.request_id(),
                revision = revision,
                "Updated manifest: {} -> {}/{}",
                self.primary,
                self.revisions,
                revision
            );
        }
        Ok(result)
    }

    /// Applies a metadata update to the named revision.
    pub async fn post_revision(
        &self,
        ctx: &mut MiddlewareContext,
        revision: &str,
        body: Body,
    ) -> Result<SubrequestResult, ManifestError> {
        let path = self.revision_path(revision).to_string();
        let builder = SubrequestBuilder::from_original(Method::POST, path, self.headers).body(body);
        Ok(self.sub.execute(ctx, builder).await?)
    }
}
