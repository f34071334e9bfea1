//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every interception layer
//! implements. A stage inspects each request and either forwards it through
//! [`Next`] unchanged, rewrites it before forwarding, or produces a response
//! of its own (possibly after issuing sub-requests).
//!
//! # Example
//!
//! ```ignore
//! use mnemosyne_middleware::{BoxFuture, Middleware, Next, Request, Response};
//! use mnemosyne_middleware::context::MiddlewareContext;
//!
//! struct LoggingMiddleware;
//!
//! impl Middleware for LoggingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "logging"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             println!("Request: {:?}", ctx.request_id());
//!             let response = next.run(ctx, request).await;
//!             println!("Response: {:?}", response.status());
//!             response
//!         })
//!     }
//! }
//! ```

use crate::backend::{Backend, TransportFailure};
use crate::context::MiddlewareContext;
use crate::types::{Request, Response, ResponseExt};
use http::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased middleware that can be stored in a pipeline.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage that does not apply to a request MUST forward it unchanged
/// - A stage MAY call `next.run()` more than once; every call after the
///   first is a sub-request and enters the pipeline directly downstream
/// - A stage MUST NOT retry a downstream call on its own
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    ///
    /// This name is used for logging, metrics, and capability discovery.
    fn name(&self) -> &'static str;

    /// Returns the capability description advertised for this stage.
    ///
    /// Stages that return `Some` are listed by the info endpoint.
    fn info(&self) -> Option<serde_json::Value> {
        None
    }

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// Handle on the remainder of the pipeline.
///
/// `Next` is `Copy`: a stage can dispatch several requests downstream, which
/// is how sub-requests are issued. The final hop is the backing store.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [BoxedMiddleware],
    backend: &'a dyn Backend,
}

impl<'a> Next<'a> {
    /// Creates a `Next` that runs `stages` in order, then `backend`.
    pub fn new(stages: &'a [BoxedMiddleware], backend: &'a dyn Backend) -> Self {
        Self { stages, backend }
    }

    /// Creates a `Next` that dispatches straight to the backing store.
    pub fn backend(backend: &'a dyn Backend) -> Self {
        Self {
            stages: &[],
            backend,
        }
    }

    /// Invokes the next middleware, or the backing store when none remain.
    ///
    /// A backing store that cannot be reached yields a 502 response carrying
    /// a [`TransportFailure`] extension.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    backend: self.backend,
                };
                stage.process(ctx, request, next).await
            }
            None => {
                let method = request.method().clone();
                let path = request.uri().path().to_string();
                match self.backend.call(ctx, request).await {
                    Ok(response) => response,
                    Err(err) => {
                        tracing::error!(
                            request_id = %ctx.request_id(),
                            http.method = %method,
                            http.path = %path,
                            error = %err,
                            "Backing store unreachable"
                        );
                        let mut response =
                            Response::error(StatusCode::BAD_GATEWAY, "Backing store unreachable");
                        response.extensions_mut().insert(TransportFailure {
                            message: err.to_string(),
                        });
                        response
                    }
                }
            }
        }
    }

    /// Collects the capability descriptions of every remaining stage.
    #[must_use]
    pub fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        self.stages
            .iter()
            .filter_map(|stage| stage.info().map(|info| (stage.name().to_string(), info)))
            .collect()
    }

    /// Returns the names of the remaining stages.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TransportError;
    use crate::types::{collect_body, empty, full};

    struct Echo;

    impl Backend for Echo {
        fn call<'a>(
            &'a self,
            _ctx: &'a MiddlewareContext,
            request: Request,
        ) -> BoxFuture<'a, Result<Response, TransportError>> {
            Box::pin(async move {
                Ok(http::Response::new(full(request.uri().path().to_string())))
            })
        }
    }

    struct Refused;

    impl Backend for Refused {
        fn call<'a>(
            &'a self,
            _ctx: &'a MiddlewareContext,
            _request: Request,
        ) -> BoxFuture<'a, Result<Response, TransportError>> {
            Box::pin(async { Err(TransportError::new("connection refused")) })
        }
    }

    struct Prefix(&'static str);

    impl Middleware for Prefix {
        fn name(&self) -> &'static str {
            self.0
        }

        fn info(&self) -> Option<serde_json::Value> {
            Some(serde_json::json!({ "prefix": self.0 }))
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let (mut parts, body) = request.into_parts();
                let uri = format!("/{}{}", self.0, parts.uri.path());
                parts.uri = uri.parse().unwrap();
                next.run(ctx, Request::from_parts(parts, body)).await
            })
        }
    }

    fn request(path: &str) -> Request {
        http::Request::builder().uri(path).body(empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order_then_backend() {
        let stages: Vec<BoxedMiddleware> = vec![Arc::new(Prefix("b")), Arc::new(Prefix("a"))];
        let next = Next::new(&stages, &Echo);
        let mut ctx = MiddlewareContext::new();

        let response = next.run(&mut ctx, request("/x")).await;
        let body = collect_body(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"/a/b/x");
    }

    #[tokio::test]
    async fn test_next_is_reusable() {
        let next = Next::backend(&Echo);
        let mut ctx = MiddlewareContext::new();

        let first = next.run(&mut ctx, request("/one")).await;
        let second = next.run(&mut ctx, request("/two")).await;
        assert_eq!(&collect_body(first.into_body()).await.unwrap()[..], b"/one");
        assert_eq!(&collect_body(second.into_body()).await.unwrap()[..], b"/two");
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_bad_gateway() {
        let next = Next::backend(&Refused);
        let mut ctx = MiddlewareContext::new();

        let response = next.run(&mut ctx, request("/v1/a/c/o")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let failure = response.extensions().get::<TransportFailure>().unwrap();
        assert!(failure.message.contains("connection refused"));
    }

    #[test]
    fn test_capabilities_lists_advertising_stages() {
        let stages: Vec<BoxedMiddleware> = vec![Arc::new(Prefix("revisions"))];
        let next = Next::new(&stages, &Echo);
        let caps = next.capabilities();
        assert_eq!(caps["revisions"]["prefix"], "revisions");
        assert_eq!(next.stage_names(), vec!["revisions"]);
    }
}
