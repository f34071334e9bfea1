//! Sub-request executor.
//!
//! Stages that need to talk to the backing store on the caller's behalf
//! (reading a manifest, writing a revision, updating a pointer) build a
//! [`SubrequestBuilder`] and run it through a [`Subrequest`]. The request
//! enters the pipeline directly downstream of the issuing stage, so it is
//! indistinguishable from an external request to everything below it.
//!
//! Response bodies are collected into memory. Sub-requests carry control
//! plane payloads; the only bulk data they move is a request body streamed
//! through untouched.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use http::{Method, StatusCode, Uri};
use mnemosyne_core::{headers::AUTH_HEADERS, GatewayError};
use thiserror::Error;

use crate::backend::TransportFailure;
use crate::context::MiddlewareContext;
use crate::middleware::Next;
use crate::types::{collect_body, empty, full, Body, Request, Response};

/// Request extension naming the stage that issued a sub-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubrequestSource(pub &'static str);

/// Errors raised while executing a sub-request.
///
/// An error status from the store is not an error here; it is returned in
/// the [`SubrequestResult`] for the caller to interpret.
#[derive(Debug, Clone, Error)]
pub enum SubrequestError {
    /// The backing store could not be reached.
    #[error("sub-request transport error: {0}")]
    Transport(String),

    /// The response body could not be read.
    #[error("failed to read sub-request response: {0}")]
    Body(String),

    /// The sub-request could not be constructed.
    #[error("invalid sub-request: {0}")]
    Invalid(String),
}

impl From<SubrequestError> for GatewayError {
    fn from(err: SubrequestError) -> Self {
        match err {
            SubrequestError::Transport(_) | SubrequestError::Body(_) => {
                Self::transport(err.to_string())
            }
            SubrequestError::Invalid(_) => Self::internal(err.to_string()),
        }
    }
}

/// Status, headers and body of a completed sub-request.
///
/// Fully owned by the caller.
#[derive(Debug, Clone)]
pub struct SubrequestResult {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl SubrequestResult {
    /// Returns `true` for a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Converts the result into a response for the original caller.
    pub fn into_response(self) -> Response {
        let mut response = http::Response::new(full(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Describes one sub-request.
pub struct SubrequestBuilder {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Body,
}

impl SubrequestBuilder {
    /// Starts a sub-request that inherits only the caller's credentials.
    pub fn new(method: Method, path: impl Into<String>, original: &HeaderMap) -> Self {
        let mut headers = HeaderMap::new();
        for name in AUTH_HEADERS {
            for value in original.get_all(name) {
                headers.append(HeaderName::from_static(name), value.clone());
            }
        }
        Self {
            method,
            path: path.into(),
            headers,
            body: empty(),
        }
    }

    /// Starts a sub-request that carries every header of the original
    /// request.
    pub fn from_original(method: Method, path: impl Into<String>, original: &HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers: original.clone(),
            body: empty(),
        }
    }

    /// Sets a header, replacing any inherited value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Marks the request as carrying no body.
    pub fn no_body(self) -> Self {
        self.header(CONTENT_LENGTH, HeaderValue::from_static("0"))
            .body(empty())
    }

    /// Returns the target path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn build(self, source: &'static str) -> Result<Request, SubrequestError> {
        let uri: Uri = self
            .path
            .parse()
            .map_err(|e| SubrequestError::Invalid(format!("{}: {e}", self.path)))?;
        let mut request = http::Request::new(self.body);
        *request.method_mut() = self.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = self.headers;
        request.extensions_mut().insert(SubrequestSource(source));
        Ok(request)
    }
}

/// Issues sub-requests into the downstream pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Subrequest<'a> {
    next: Next<'a>,
    source: &'static str,
}

impl<'a> Subrequest<'a> {
    /// Creates an executor dispatching into `next`, tagged with `source`.
    pub fn new(next: Next<'a>, source: &'static str) -> Self {
        Self { next, source }
    }

    /// Runs one sub-request and collects its result.
    ///
    /// Never retries.
    pub async fn execute(
        &self,
        ctx: &mut MiddlewareContext,
        builder: SubrequestBuilder,
    ) -> Result<SubrequestResult, SubrequestError> {
        let request = builder.build(self.source)?;
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        metrics::counter!(
            "mnemosyne_subrequests_total",
            "source" => self.source,
            "method" => method.to_string()
        )
        .increment(1);

        let response = self.next.run(ctx, request).await;
        if let Some(failure) = response.extensions().get::<TransportFailure>() {
            return Err(SubrequestError::Transport(failure.message.clone()));
        }

        let (parts, body) = response.into_parts();
        let body = collect_body(body)
            .await
            .map_err(|e| SubrequestError::Body(e.to_string()))?;

        tracing::debug!(
            request_id = %ctx.request_id(),
            source = self.source,
            http.method = %method,
            http.path = %path,
            http.status = parts.status.as_u16(),
            "Sub-request completed"
        );

        Ok(SubrequestResult {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
