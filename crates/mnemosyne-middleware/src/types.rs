//! Common types used throughout the middleware pipeline.
//!
//! Bodies are boxed streams so object data can flow through the pipeline
//! without being buffered. Requests and responses are plain `http` types
//! over that body.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use mnemosyne_core::GatewayError;

/// Error type carried by streaming bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The streaming body type used for requests and responses.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// The HTTP request type used in the middleware pipeline.
pub type Request = http::Request<Body>;

/// The HTTP response type used in the middleware pipeline.
pub type Response = http::Response<Body>;

/// Creates a body holding `data` in a single frame.
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Creates an empty body.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Reads a body to completion.
///
/// Only used for control-plane payloads; object data is never collected.
pub async fn collect_body(body: Body) -> Result<Bytes, BoxError> {
    Ok(body.collect().await?.to_bytes())
}

/// Extension trait for building locally generated responses.
pub trait ResponseExt {
    /// Creates a plain-text error response with the given status code.
    fn error(status: StatusCode, message: &str) -> Response;

    /// Creates a JSON response.
    fn json(status: StatusCode, value: &serde_json::Value) -> Response;

    /// Creates the response for a [`GatewayError`].
    fn from_gateway_error(error: &GatewayError) -> Response;
}

impl ResponseExt for Response {
    fn error(status: StatusCode, message: &str) -> Response {
        text_response(
            status,
            "text/plain; charset=utf-8",
            Bytes::from(message.to_string()),
        )
    }

    fn json(status: StatusCode, value: &serde_json::Value) -> Response {
        text_response(status, "application/json", Bytes::from(value.to_string()))
    }

    fn from_gateway_error(error: &GatewayError) -> Response {
        Self::error(error.status_code(), &error.client_message())
    }
}

fn text_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    let length = body.len();
    let mut response = http::Response::new(full(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}
