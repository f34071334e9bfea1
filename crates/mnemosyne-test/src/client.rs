//! Test client for in-process gateway requests.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::Method;
use mnemosyne_middleware::types::{empty, full};
use mnemosyne_middleware::{BoxFuture, Pipeline, Request, Response};

use crate::error::TestError;
use crate::response::TestResponse;

/// Handler function type for the test client.
pub type TestHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// A client that drives requests through a pipeline without a socket.
///
/// # Example
///
/// ```ignore
/// use mnemosyne_test::{MemoryStore, TestClient};
///
/// let store = MemoryStore::new();
/// let client = TestClient::pipeline(Pipeline::builder(store.clone()).build())
///     .with_default_header("x-auth-token", "secret");
///
/// let response = client.put("/v1/a/c/o").body("hello").send().await;
/// assert_eq!(response.status_code(), 201);
/// ```
#[must_use]
pub struct TestClient {
    handler: TestHandler,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Creates a test client from a handler function.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |request| Box::pin(handler(request))),
            default_headers: Vec::new(),
        }
    }

    /// Creates a test client that sends every request through `pipeline`.
    pub fn pipeline(pipeline: Pipeline) -> Self {
        let pipeline = Arc::new(pipeline);
        Self::new(move |request| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.process(request).await }
        })
    }

    /// Adds a header included in every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Creates a GET request builder.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Creates a HEAD request builder.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::HEAD, uri)
    }

    /// Creates a PUT request builder.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Creates a POST request builder.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Creates a DELETE request builder.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Creates a request builder with a custom method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest {
            client: self,
            method,
            uri: uri.as_ref().to_string(),
            headers: self.default_headers.clone(),
            body: None,
        }
    }

    async fn send_internal(&self, request: Request) -> Result<TestResponse, TestError> {
        let handler = Arc::clone(&self.handler);
        let response = (handler)(request).await;
        TestResponse::from_response(response).await
    }
}

/// A request builder bound to a test client.
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl TestClientRequest<'_> {
    /// Sets a header on the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a `Range: bytes=<start>-<end>` header.
    pub fn range(self, start: u64, end: u64) -> Self {
        self.header("range", format!("bytes={start}-{end}"))
    }

    /// Sets the raw request body. A `Content-Length` header is added.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builds the request without sending it.
    pub fn build(self) -> Result<Request, TestError> {
        let mut builder = http::Request::builder()
            .method(self.method)
            .uri(self.uri.as_str());

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TestError::InvalidHeader(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TestError::InvalidHeader(format!("{name}: {e}")))?;
            builder = builder.header(name, value);
        }

        let body = match self.body {
            Some(body) => {
                builder = builder.header(http::header::CONTENT_LENGTH, body.len());
                full(body)
            }
            None => empty(),
        };

        Ok(builder.body(body)?)
    }

    /// Sends the request and returns the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    pub async fn send(self) -> TestResponse {
        self.try_send().await.expect("request should succeed")
    }

    /// Sends the request and returns a Result.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let client = self.client;
        let request = self.build()?;
        client.send_internal(request).await
    }
}
