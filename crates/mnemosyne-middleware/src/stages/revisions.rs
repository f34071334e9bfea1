//! Object versioning stage.
//!
//! In a container whose metadata names a revisions container
//! (`X-Container-Meta-Revisions-Location`), every object is a manifest
//! pointing at its current revision. This stage hides the indirection:
//!
//! | Method | Behavior |
//! |---|---|
//! | `GET`/`HEAD` | read the pointer, then serve the current revision |
//! | `PUT` | write a new revision, then move the pointer to it |
//! | `POST` | apply the metadata update to the current revision |
//!
//! Anything else, including `DELETE`, passes through. Deleting the primary
//! object therefore leaves every revision in place, and a deleted or
//! reverted object is restored by writing the manifest directly with the
//! `?manifest` query parameter, which bypasses this stage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::request::Parts;
use http::{Method, Uri};
use mnemosyne_core::headers::{
    CONTAINER_META_PREFIX, RAW_MANIFEST_PARAM, REVISIONS_LOCATION, REVISION_POINTER,
};
use mnemosyne_core::{GatewayError, ObjectPath};

use crate::context::MiddlewareContext;
use crate::manifest::{
    revision_name, system_clock, Clock, ContainerInfoSource, HeadContainerInfo, Manifest,
    ManifestError,
};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::subrequest::{Subrequest, SubrequestError};
use crate::types::{Body, Request, Response, ResponseExt};

const SOURCE: &str = "revisions";

/// Middleware that versions objects through manifest indirection.
#[derive(Clone)]
pub struct RevisionsMiddleware {
    container_info: Arc<dyn ContainerInfoSource>,
    clock: Clock,
}

impl RevisionsMiddleware {
    /// Creates the stage with the default container lookup and the system
    /// clock.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder.
    pub fn builder() -> RevisionsMiddlewareBuilder {
        RevisionsMiddlewareBuilder::default()
    }

    /// Returns the object path when the request must be intercepted.
    fn intercepted_path(request: &Request) -> Option<ObjectPath> {
        if !matches!(
            *request.method(),
            Method::GET | Method::HEAD | Method::PUT | Method::POST
        ) {
            return None;
        }
        if has_query_param(request.uri().query(), RAW_MANIFEST_PARAM) {
            return None;
        }
        ObjectPath::parse(request.uri().path()).filter(ObjectPath::is_object)
    }

    async fn handle(
        &self,
        ctx: &mut MiddlewareContext,
        next: Next<'_>,
        path: &ObjectPath,
        parts: Parts,
        body: Body,
    ) -> Result<Response, ManifestError> {
        let sub = Subrequest::new(next, SOURCE);
        let container_path = path.container_path().unwrap_or_default();
        let info = self
            .container_info
            .container_info(ctx, &container_path, &parts.headers, sub)
            .await?;

        if !info.status.is_success() {
            return Err(ManifestError::ContainerLookup(info.status));
        }
        let Some(location) = info.revisions_location() else {
            tracing::debug!(
                request_id = %ctx.request_id(),
                http.path = %path,
                "Container is not versioned"
            );
            return Ok(next.run(ctx, Request::from_parts(parts, body)).await);
        };

        match parts.method {
            Method::GET | Method::HEAD => self.read(ctx, next, path, location, parts, body).await,
            Method::PUT => self.write(ctx, next, path, location, parts, body).await,
            _ => self.update(ctx, next, path, location, parts, body).await,
        }
    }

    async fn read(
        &self,
        ctx: &mut MiddlewareContext,
        next: Next<'_>,
        path: &ObjectPath,
        location: &str,
        mut parts: Parts,
        body: Body,
    ) -> Result<Response, ManifestError> {
        let manifest = Manifest::new(Subrequest::new(next, SOURCE), path, location, &parts.headers);
        let current = manifest.current_revision(ctx).await?;

        let target = manifest.revision_path(&current).to_string();
        parts.uri = rewrite_path(&parts.uri, &target)?;
        Ok(next.run(ctx, Request::from_parts(parts, body)).await)
    }

    async fn write(
        &self,
        ctx: &mut MiddlewareContext,
        next: Next<'_>,
        path: &ObjectPath,
        location: &str,
        parts: Parts,
        body: Body,
    ) -> Result<Response, ManifestError> {
        let manifest = Manifest::new(Subrequest::new(next, SOURCE), path, location, &parts.headers);
        let object = path.object_name().unwrap_or_default();
        let revision = revision_name(&object, (self.clock)());

        let written = manifest.write_revision(ctx, &revision, body).await?;
        if !written.is_success() {
            return Ok(written.into_response());
        }
        metrics::counter!("mnemosyne_revisions_created_total").increment(1);

        match manifest.update_pointer(ctx, &revision).await {
            Ok(updated) if updated.is_success() => {}
            Ok(updated) => tracing::warn!(
                request_id = %ctx.request_id(),
                http.path = %path,
                http.status = updated.status.as_u16(),
                revision = %revision,
                "Manifest update failed; revision left unreferenced"
            ),
            Err(err) => tracing::warn!(
                request_id = %ctx.request_id(),
                http.path = %path,
                error = %err,
                revision = %revision,
                "Manifest update failed; revision left unreferenced"
            ),
        }

        Ok(written.into_response())
    }

    async fn update(
        &self,
        ctx: &mut MiddlewareContext,
        next: Next<'_>,
        path: &ObjectPath,
        location: &str,
        parts: Parts,
        body: Body,
    ) -> Result<Response, ManifestError> {
        let manifest = Manifest::new(Subrequest::new(next, SOURCE), path, location, &parts.headers);
        let current = manifest.current_revision(ctx).await?;
        let result = manifest.post_revision(ctx, &current, body).await?;
        Ok(result.into_response())
    }
}

impl Default for RevisionsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RevisionsMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionsMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for RevisionsMiddleware {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn info(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "pointer_header": REVISION_POINTER,
            "location_metadata": format!("{CONTAINER_META_PREFIX}{REVISIONS_LOCATION}"),
            "raw_manifest_param": RAW_MANIFEST_PARAM,
        }))
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(path) = Self::intercepted_path(&request) else {
                return next.run(ctx, request).await;
            };

            let (parts, body) = request.into_parts();
            match self.handle(ctx, next, &path, parts, body).await {
                Ok(response) => response,
                Err(err) => {
                    let err = GatewayError::from(err);
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        http.path = %path,
                        error = %err,
                        "Versioned request failed"
                    );
                    Response::from_gateway_error(&err)
                }
            }
        })
    }
}

/// Builder for [`RevisionsMiddleware`].
#[derive(Default)]
pub struct RevisionsMiddlewareBuilder {
    container_info: Option<Arc<dyn ContainerInfoSource>>,
    clock: Option<Clock>,
}

impl RevisionsMiddlewareBuilder {
    /// Sets the container metadata lookup.
    pub fn container_info(mut self, source: impl ContainerInfoSource) -> Self {
        self.container_info = Some(Arc::new(source));
        self
    }

    /// Sets the clock used to name revisions.
    pub fn clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Builds the stage.
    pub fn build(self) -> RevisionsMiddleware {
        RevisionsMiddleware {
            container_info: self
                .container_info
                .unwrap_or_else(|| Arc::new(HeadContainerInfo)),
            clock: self.clock.unwrap_or_else(system_clock),
        }
    }
}

/// Returns `true` when `query` contains `name` as a key.
pub fn has_query_param(query: Option<&str>, name: &str) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .any(|pair| pair.split('=').next() == Some(name))
    })
}

fn rewrite_path(uri: &Uri, path: &str) -> Result<Uri, SubrequestError> {
    let target = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    target
        .parse()
        .map_err(|e| SubrequestError::Invalid(format!("{target}: {e}")))
}
