//! At-rest encryption stage.
//!
//! Object bodies are encrypted on PUT and decrypted on GET. Every other
//! method, and every account or container request, passes through
//! untouched. Metadata and listings are never encrypted.
//!
//! The stage requires [`EncryptionParams`] in the context. When they are
//! missing the request is refused with 503 rather than served or stored in
//! the clear.
//!
//! ## Range reads
//!
//! A 206 response is decrypted by seeking the keystream to the first byte
//! named in its `Content-Range`. Requests for several ranges at once are
//! refused with 416 because a multipart body cannot be decrypted in place.

use http::header::{CONTENT_RANGE, RANGE};
use http::{Method, StatusCode};
use mnemosyne_core::{GatewayError, ObjectPath};

use super::key_management::EncryptionParams;
use crate::cipher::{transform_body, CipherConfig, Keystream};
use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};

/// Returns the path an implicit IV is derived from.
///
/// The store decodes request paths, so every spelling of one object must
/// yield the same keystream.
fn iv_source(raw_path: &str) -> String {
    ObjectPath::parse(raw_path).map_or_else(|| raw_path.to_string(), |path| path.decoded())
}

/// Message returned when no key management stage ran.
pub const NOT_CONFIGURED: &str = "At-rest encryption improperly configured";

/// Middleware that binds the cipher adapter to object bodies.
#[derive(Debug, Clone, Copy)]
pub struct EncryptionMiddleware {
    cipher: CipherConfig,
}

impl EncryptionMiddleware {
    /// Creates the stage, resolving the configured algorithm and mode.
    ///
    /// An unsupported pair is a configuration error.
    pub fn new(algorithm: &str, mode: &str) -> Result<Self, GatewayError> {
        let cipher = CipherConfig::new(algorithm, mode)?;
        Ok(Self::with_cipher(cipher))
    }

    /// Creates the stage from an already resolved cipher.
    pub const fn with_cipher(cipher: CipherConfig) -> Self {
        Self { cipher }
    }

    /// Returns the resolved cipher.
    pub const fn cipher(&self) -> CipherConfig {
        self.cipher
    }

    fn applies_to(request: &Request) -> bool {
        matches!(*request.method(), Method::GET | Method::PUT)
            && ObjectPath::parse(request.uri().path()).is_some_and(|p| p.is_object())
    }

    fn keystream(
        &self,
        ctx: &MiddlewareContext,
        request: &Request,
    ) -> Result<Keystream, GatewayError> {
        let params = ctx
            .get_extension::<EncryptionParams>()
            .ok_or_else(|| GatewayError::service_unavailable(NOT_CONFIGURED))?;
        let material = params.resolve(request).map_err(|e| {
            tracing::warn!(
                request_id = %ctx.request_id(),
                http.path = %request.uri().path(),
                error = %e,
                "Key source returned unusable key material"
            );
            GatewayError::from(e)
        })?;
        Ok(self
            .cipher
            .keystream(&material, &iv_source(request.uri().path()))?)
    }

    fn decrypt_response(
        mut keystream: Keystream,
        response: Response,
    ) -> Result<Response, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::PARTIAL_CONTENT {
            let offset = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_start)
                .ok_or_else(|| {
                    GatewayError::internal("Partial response without a usable Content-Range")
                })?;
            keystream.seek(offset).map_err(GatewayError::from)?;
        }
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, transform_body(body, keystream)))
    }
}

/// Parses the first byte offset of `bytes <start>-<end>/<size>`.
pub fn parse_content_range_start(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}

impl Middleware for EncryptionMiddleware {
    fn name(&self) -> &'static str {
        "encryption"
    }

    fn info(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "algorithm": self.cipher.algorithm().name(),
            "mode": self.cipher.algorithm().mode(),
        }))
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if !Self::applies_to(&request) {
                return next.run(ctx, request).await;
            }

            let keystream = match self.keystream(ctx, &request) {
                Ok(keystream) => keystream,
                Err(err) => return Response::from_gateway_error(&err),
            };

            let method = request.method().clone();
            metrics::counter!(
                "mnemosyne_encrypted_requests_total",
                "method" => method.to_string()
            )
            .increment(1);
            tracing::debug!(
                request_id = %ctx.request_id(),
                http.method = %method,
                http.path = %request.uri().path(),
                cipher = ?keystream,
                "Binding cipher to object body"
            );

            if method == Method::PUT {
                let (parts, body) = request.into_parts();
                let request = Request::from_parts(parts, transform_body(body, keystream));
                return next.run(ctx, request).await;
            }

            let multi_range = request
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains(','));
            if multi_range {
                return Response::from_gateway_error(&GatewayError::range_not_satisfiable(
                    "Multiple ranges are not supported on encrypted objects",
                ));
            }

            let response = next.run(ctx, request).await;
            Self::decrypt_response(keystream, response)
                .unwrap_or_else(|err| Response::from_gateway_error(&err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, TransportError};
    use crate::middleware::BoxedMiddleware;
    use crate::stages::key_management::KeyManagementMiddleware;
    use crate::types::{collect_body, full};
    use bytes::Bytes;
    use mnemosyne_core::KeyMaterial;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const PLAINTEXT: &[u8] = b"the quick brown fox jumps over the lazy dog";

    /// Single-object store that keeps the last PUT body and serves ranges.
    #[derive(Default)]
    struct OneObject {
        stored: Mutex<Option<Bytes>>,
        hits: Mutex<usize>,
    }

    impl Backend for OneObject {
        fn call<'a>(
            &'a self,
            _ctx: &'a MiddlewareContext,
            request: Request,
        ) -> BoxFuture<'a, Result<Response, TransportError>> {
            Box::pin(async move {
                *self.hits.lock() += 1;
                let (parts, body) = request.into_parts();
                if parts.method == Method::PUT {
                    let data = collect_body(body).await.unwrap();
                    *self.stored.lock() = Some(data);
                    let mut response = http::Response::new(full(""));
                    *response.status_mut() = StatusCode::CREATED;
                    return Ok(response);
                }
                let Some(data) = self.stored.lock().clone() else {
                    let mut response = http::Response::new(full("Not Found"));
                    *response.status_mut() = StatusCode::NOT_FOUND;
                    return Ok(response);
                };
                let range = parts
                    .headers
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("bytes="))
                    .and_then(|v| v.split_once('-'))
                    .map(|(a, b)| (a.parse::<usize>().unwrap(), b.parse::<usize>().unwrap()));
                match range {
                    Some((start, end)) => {
                        let mut response =
                            http::Response::new(full(data.slice(start..=end)));
                        *response.status_mut() = StatusCode::PARTIAL_CONTENT;
                        response.headers_mut().insert(
                            CONTENT_RANGE,
                            format!("bytes {start}-{end}/{}", data.len()).parse().unwrap(),
                        );
                        Ok(response)
                    }
                    None => Ok(http::Response::new(full(data))),
                }
            })
        }
    }

    fn key() -> KeyMaterial {
        KeyMaterial::key(vec![3u8; 32]).unwrap()
    }

    fn stages() -> Vec<BoxedMiddleware> {
        vec![
            Arc::new(KeyManagementMiddleware::with_static_key(key())),
            Arc::new(EncryptionMiddleware::new("aes-256", "ctr").unwrap()),
        ]
    }

    fn request(method: Method, uri: &str, body: &'static [u8]) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(full(body))
            .unwrap()
    }

    async fn put_object(stages: &[BoxedMiddleware], store: &OneObject) {
        let mut ctx = MiddlewareContext::new();
        let response = Next::new(stages, store)
            .run(&mut ctx, request(Method::PUT, "/v1/a/c/o", PLAINTEXT))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_put_stores_ciphertext_and_get_decrypts() {
        let stages = stages();
        let store = OneObject::default();
        put_object(&stages, &store).await;

        let stored = store.stored.lock().clone().unwrap();
        assert_eq!(stored.len(), PLAINTEXT.len());
        assert_ne!(&stored[..], PLAINTEXT);

        let mut ctx = MiddlewareContext::new();
        let response = Next::new(&stages, &store)
            .run(&mut ctx, request(Method::GET, "/v1/a/c/o", b""))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = collect_body(response.into_body()).await.unwrap();
        assert_eq!(&body[..], PLAINTEXT);
    }

    #[tokio::test]
    async fn test_range_read_is_decrypted() {
        let stages = stages();
        let store = OneObject::default();
        put_object(&stages, &store).await;

        let mut ctx = MiddlewareContext::new();
        let mut get = request(Method::GET, "/v1/a/c/o", b"");
        get.headers_mut()
            .insert(RANGE, "bytes=4-18".parse().unwrap());
        let response = Next::new(&stages, &store).run(&mut ctx, get).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let body = collect_body(response.into_body()).await.unwrap();
        assert_eq!(&body[..], &PLAINTEXT[4..=18]);
    }

    #[tokio::test]
    async fn test_multi_range_is_refused() {
        let stages = stages();
        let store = OneObject::default();

        let mut ctx = MiddlewareContext::new();
        let mut get = request(Method::GET, "/v1/a/c/o", b"");
        get.headers_mut()
            .insert(RANGE, "bytes=0-1,5-6".parse().unwrap());
        let response = Next::new(&stages, &store).run(&mut ctx, get).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(*store.hits.lock(), 0);
    }

    #[tokio::test]
    async fn test_error_responses_are_not_decrypted() {
        let stages = stages();
        let store = OneObject::default();

        let mut ctx = MiddlewareContext::new();
        let response = Next::new(&stages, &store)
            .run(&mut ctx, request(Method::GET, "/v1/a/c/o", b""))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = collect_body(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"Not Found");
    }

    #[tokio::test]
    async fn test_missing_params_is_service_unavailable() {
        let stages: Vec<BoxedMiddleware> =
            vec![Arc::new(EncryptionMiddleware::new("aes-256", "ctr").unwrap())];
        let store = OneObject::default();

        for method in [Method::GET, Method::PUT] {
            let mut ctx = MiddlewareContext::new();
            let response = Next::new(&stages, &store)
                .run(&mut ctx, request(method, "/v1/a/c/o", PLAINTEXT))
                .await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            let body = collect_body(response.into_body()).await.unwrap();
            assert_eq!(&body[..], NOT_CONFIGURED.as_bytes());
        }
        assert_eq!(*store.hits.lock(), 0);
        assert!(store.stored.lock().is_none());
    }

    #[tokio::test]
    async fn test_passthrough_without_params() {
        let stages: Vec<BoxedMiddleware> =
            vec![Arc::new(EncryptionMiddleware::new("aes-256", "ctr").unwrap())];
        let store = OneObject::default();

        for (method, uri) in [
            (Method::PUT, "/v1/a/c"),
            (Method::GET, "/v1/a"),
            (Method::HEAD, "/v1/a/c/o"),
            (Method::POST, "/v1/a/c/o"),
            (Method::DELETE, "/v1/a/c/o"),
        ] {
            let mut ctx = MiddlewareContext::new();
            let response = Next::new(&stages, &store)
                .run(&mut ctx, request(method.clone(), uri, b""))
                .await;
            assert_ne!(
                response.status(),
                StatusCode::SERVICE_UNAVAILABLE,
                "{method} {uri}"
            );
        }
        assert_eq!(*store.hits.lock(), 5);
    }

    #[tokio::test]
    async fn test_bad_key_is_internal_error() {
        let stages: Vec<BoxedMiddleware> = vec![
            Arc::new(KeyManagementMiddleware::with_static_key(
                KeyMaterial::key(vec![1u8; 5]).unwrap(),
            )),
            Arc::new(EncryptionMiddleware::new("aes-256", "ctr").unwrap()),
        ];
        let store = OneObject::default();

        let mut ctx = MiddlewareContext::new();
        let response = Next::new(&stages, &store)
            .run(&mut ctx, request(Method::PUT, "/v1/a/c/o", PLAINTEXT))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*store.hits.lock(), 0);
    }

    #[test]
    fn test_unsupported_cipher_is_configuration_error() {
        let err = EncryptionMiddleware::new("aes-256", "cbc").unwrap_err();
        assert!(matches!(err, GatewayError::Configuration { .. }));
    }

    #[test]
    fn test_parse_content_range_start() {
        assert_eq!(parse_content_range_start("bytes 4-18/43"), Some(4));
        assert_eq!(parse_content_range_start("bytes 0-0/1"), Some(0));
        assert_eq!(parse_content_range_start("bytes */43"), None);
        assert_eq!(parse_content_range_start("items 1-2/3"), None);
    }

    #[test]
    fn test_info_advertises_cipher() {
        let middleware = EncryptionMiddleware::new("chacha20", "stream").unwrap();
        let info = middleware.info().unwrap();
        assert_eq!(info["algorithm"], "chacha20");
        assert_eq!(info["mode"], "stream");
    }

    #[test]
    fn test_spellings_of_one_path_share_a_keystream() {
        let cipher = CipherConfig::new("aes-256", "ctr").unwrap();
        let mut plain = cipher.keystream(&key(), &iv_source("/v1/a/c/o.txt")).unwrap();
        let mut escaped = cipher
            .keystream(&key(), &iv_source("/v1/a/c/o%2Etxt"))
            .unwrap();
        let chunk = Bytes::from_static(PLAINTEXT);
        let ciphertext = plain.apply(&chunk);
        assert_eq!(ciphertext, escaped.apply(&chunk));

        let mut other = cipher.keystream(&key(), &iv_source("/v1/a/c/p.txt")).unwrap();
        assert_ne!(other.apply(&chunk), ciphertext);
    }

    #[tokio::test]
    async fn test_write_and_read_through_different_spellings() {
        let stages = stages();
        let store = OneObject::default();

        let mut ctx = MiddlewareContext::new();
        Next::new(&stages, &store)
            .run(&mut ctx, request(Method::PUT, "/v1/a/c/o%2Etxt", PLAINTEXT))
            .await;

        let mut ctx = MiddlewareContext::new();
        let response = Next::new(&stages, &store)
            .run(&mut ctx, request(Method::GET, "/v1/a/c/o.txt", b""))
            .await;
        let body = collect_body(response.into_body()).await.unwrap();
        assert_eq!(&body[..], PLAINTEXT);
    }
}
