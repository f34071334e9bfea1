//! Ordered interception pipeline.
//!
//! A [`Pipeline`] is an immutable list of stages in front of a backing store.
//! Requests enter at the first stage; sub-requests issued by a stage enter
//! directly downstream of it.
//!
//! ```text
//! client → info → key_management → revisions → encryption → backing store
//! ```
//!
//! Revisions sits above encryption, so the revision objects it writes are
//! encrypted under their own path while the manifests it writes are not
//! (they carry no body).

use std::sync::Arc;

use crate::backend::Backend;
use crate::context::MiddlewareContext;
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::types::{Request, Response};

/// The assembled pipeline.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
    backend: Arc<dyn Backend>,
}

impl Pipeline {
    /// Creates a builder for a pipeline ending at `backend`.
    pub fn builder(backend: impl Backend) -> PipelineBuilder {
        PipelineBuilder::new(Arc::new(backend))
    }

    /// Creates a builder for a pipeline ending at a shared backend.
    pub fn builder_shared(backend: Arc<dyn Backend>) -> PipelineBuilder {
        PipelineBuilder::new(backend)
    }

    /// Processes a request with a fresh context.
    pub async fn process(&self, request: Request) -> Response {
        let mut ctx = MiddlewareContext::new();
        self.process_with_context(&mut ctx, request).await
    }

    /// Processes a request with a caller-supplied context.
    pub async fn process_with_context(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
    ) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = self.next().run(ctx, request).await;

        tracing::debug!(
            request_id = %ctx.request_id(),
            http.method = %method,
            http.path = %path,
            http.status = response.status().as_u16(),
            duration_ms = ctx.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    /// Returns the capabilities advertised by all stages.
    #[must_use]
    pub fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        self.next().capabilities()
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.next().stage_names()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn next(&self) -> Next<'_> {
        Next::new(&self.stages, self.backend.as_ref())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Pipeline`].
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
    backend: Arc<dyn Backend>,
}

impl PipelineBuilder {
    fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            stages: Vec::new(),
            backend,
        }
    }

    /// Appends a stage. Stages run in the order they are added.
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends a stage when `middleware` is `Some`.
    pub fn optional_stage<M: Middleware>(self, middleware: Option<M>) -> Self {
        match middleware {
            Some(middleware) => self.stage(middleware),
            None => self,
        }
    }

    /// Builds the pipeline.
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            backend: self.backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TransportError;
    use crate::middleware::BoxFuture;
    use crate::types::{collect_body, empty, full};
    use http::StatusCode;

    struct Echo;

    impl Backend for Echo {
        fn call<'a>(
            &'a self,
            _ctx: &'a MiddlewareContext,
            request: Request,
        ) -> BoxFuture<'a, Result<Response, TransportError>> {
            Box::pin(async move { Ok(http::Response::new(full(request.uri().to_string()))) })
        }
    }

    /// Rewrites the path by appending a suffix.
    struct Suffix(&'static str);

    impl Middleware for Suffix {
        fn name(&self) -> &'static str {
            self.0
        }

        fn info(&self) -> Option<serde_json::Value> {
            Some(serde_json::json!(self.0))
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            mut request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let uri = format!("{}{}", request.uri().path(), self.0);
                if let Ok(uri) = uri.parse() {
                    *request.uri_mut() = uri;
                }
                next.run(ctx, request).await
            })
        }
    }

    fn request(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let pipeline = Pipeline::builder(Echo)
            .stage(Suffix("-a"))
            .stage(Suffix("-b"))
            .build();

        let response = pipeline.process(request("/x")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = collect_body(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"/x-a-b");
    }

    #[tokio::test]
    async fn test_empty_pipeline_reaches_backend() {
        let pipeline = Pipeline::builder(Echo).build();
        assert_eq!(pipeline.stage_count(), 0);

        let response = pipeline.process(request("/v1/a")).await;
        let body = collect_body(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"/v1/a");
    }

    #[test]
    fn test_optional_stage() {
        let pipeline = Pipeline::builder(Echo)
            .optional_stage(Some(Suffix("-a")))
            .optional_stage(None::<Suffix>)
            .build();
        assert_eq!(pipeline.stage_names(), vec!["-a"]);
    }

    #[test]
    fn test_capabilities() {
        let pipeline = Pipeline::builder(Echo)
            .stage(Suffix("-a"))
            .stage(Suffix("-b"))
            .build();
        let caps = pipeline.capabilities();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps["-b"], serde_json::json!("-b"));
    }
}
