//! Capability discovery endpoint.

use http::{Method, StatusCode};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};

/// Default path of the discovery endpoint.
pub const DEFAULT_INFO_PATH: &str = "/info";

/// Answers `GET <path>` with the capabilities advertised by every
/// downstream stage, keyed by stage name.
///
/// Place it first so every other stage is downstream of it.
#[derive(Debug, Clone)]
pub struct InfoMiddleware {
    path: String,
}

impl InfoMiddleware {
    /// Serves discovery at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path served.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Default for InfoMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_INFO_PATH)
    }
}

impl Middleware for InfoMiddleware {
    fn name(&self) -> &'static str {
        "info"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if request.method() != Method::GET || request.uri().path() != self.path {
                return next.run(ctx, request).await;
            }

            tracing::debug!(
                request_id = %ctx.request_id(),
                stages = ?next.stage_names(),
                "Serving capability info"
            );
            let capabilities = serde_json::Value::Object(next.capabilities());
            Response::json(StatusCode::OK, &capabilities)
        })
    }
}
