//! The backing object store.
//!
//! The last hop of every pipeline is a [`Backend`]. [`HttpBackend`] forwards
//! requests to a real store over HTTP/1.1, streaming bodies in both
//! directions.

use crate::context::MiddlewareContext;
use crate::middleware::BoxFuture;
use crate::types::{BoxError, Request, Response};
use http::header::{HeaderMap, HeaderName, HOST};
use http::uri::{Authority, Scheme, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

/// The backing store could not be reached, or the exchange broke off.
///
/// This is distinct from an error status: a store that answers 500 produced
/// a response, a store that refused the connection did not.
#[derive(Debug, Clone, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response extension marking a 502 produced because the backing store was
/// unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Description of the underlying transport error.
    pub message: String,
}

/// The terminal stage of a pipeline.
pub trait Backend: Send + Sync + 'static {
    /// Performs one request against the store.
    ///
    /// Implementations MUST NOT retry.
    fn call<'a>(
        &'a self,
        ctx: &'a MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Result<Response, TransportError>>;
}

/// Hop-by-hop headers that are never forwarded.
pub static HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Check if a header is hop-by-hop.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Backing store reached over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client<HttpConnector, crate::types::Body>,
    authority: Authority,
}

impl HttpBackend {
    /// Creates a backend for the store at `base_url`.
    ///
    /// Only `http://` URLs are accepted; any path component is ignored.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let uri: Uri = base_url
            .parse()
            .map_err(|e| TransportError::new(format!("invalid backend url {base_url}: {e}")))?;
        if uri.scheme() != Some(&Scheme::HTTP) {
            return Err(TransportError::new(format!(
                "backend url must use http: {base_url}"
            )));
        }
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| TransportError::new(format!("backend url has no host: {base_url}")))?;

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self { client, authority })
    }

    /// Returns the `host:port` the backend connects to.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn target(&self, uri: &Uri) -> Result<Uri, TransportError> {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| TransportError::new(format!("invalid request uri: {e}")))
    }
}

impl Backend for HttpBackend {
    fn call<'a>(
        &'a self,
        ctx: &'a MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Result<Response, TransportError>> {
        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            parts.uri = self.target(&parts.uri)?;
            strip_hop_by_hop(&mut parts.headers);
            parts.headers.remove(HOST);

            tracing::debug!(
                request_id = %ctx.request_id(),
                http.method = %parts.method,
                http.url = %parts.uri,
                "Forwarding to backing store"
            );

            let response = self
                .client
                .request(Request::from_parts(parts, body))
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;

            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            let body = body
                .map_err(|err: hyper::Error| -> BoxError { Box::new(err) })
                .boxed_unsync();
            Ok(Response::from_parts(parts, body))
        })
    }
}
