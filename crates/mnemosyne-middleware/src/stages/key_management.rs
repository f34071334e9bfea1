//! Key management collaborator.
//!
//! The encryption stage never derives keys itself. A stage upstream of it
//! publishes [`EncryptionParams`] in the [`MiddlewareContext`]; the
//! encryption stage asks the contained [`KeySource`] for the key material of
//! each request it transforms.
//!
//! [`KeyManagementMiddleware`] with a [`StaticKeySource`] is the trivial
//! deployment: one fixed key for every object. Real deployments supply their
//! own `KeySource`, or a closure.

use std::sync::Arc;

use mnemosyne_core::{KeyFormatError, KeyMaterial};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};

/// Resolves the key material for a request.
pub trait KeySource: Send + Sync + 'static {
    /// Returns the key (and optionally IV) for the object `request` targets.
    fn resolve(&self, request: &Request) -> Result<KeyMaterial, KeyFormatError>;
}

impl<F> KeySource for F
where
    F: Fn(&Request) -> Result<KeyMaterial, KeyFormatError> + Send + Sync + 'static,
{
    fn resolve(&self, request: &Request) -> Result<KeyMaterial, KeyFormatError> {
        self(request)
    }
}

/// Serves the same key material for every request.
#[derive(Debug, Clone)]
pub struct StaticKeySource {
    material: KeyMaterial,
}

impl StaticKeySource {
    /// Creates a source serving `material`.
    pub fn new(material: KeyMaterial) -> Self {
        Self { material }
    }
}

impl KeySource for StaticKeySource {
    fn resolve(&self, _request: &Request) -> Result<KeyMaterial, KeyFormatError> {
        Ok(self.material.clone())
    }
}

/// Per-request encryption parameters, stored as a context extension.
#[derive(Clone)]
pub struct EncryptionParams {
    source: Arc<dyn KeySource>,
}

impl EncryptionParams {
    /// Wraps a key source.
    pub fn new(source: impl KeySource) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Wraps a shared key source.
    pub fn from_arc(source: Arc<dyn KeySource>) -> Self {
        Self { source }
    }

    /// Resolves the key material for `request`.
    pub fn resolve(&self, request: &Request) -> Result<KeyMaterial, KeyFormatError> {
        self.source.resolve(request)
    }
}

impl std::fmt::Debug for EncryptionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionParams").finish_non_exhaustive()
    }
}

/// Publishes [`EncryptionParams`] for every request.
#[derive(Debug, Clone)]
pub struct KeyManagementMiddleware {
    params: EncryptionParams,
}

impl KeyManagementMiddleware {
    /// Creates the stage around a key source.
    pub fn new(source: impl KeySource) -> Self {
        Self {
            params: EncryptionParams::new(source),
        }
    }

    /// Creates the stage serving one fixed key.
    pub fn with_static_key(material: KeyMaterial) -> Self {
        Self::new(StaticKeySource::new(material))
    }
}

impl Middleware for KeyManagementMiddleware {
    fn name(&self) -> &'static str {
        "key_management"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            ctx.set_extension(self.params.clone());
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, TransportError};
    use crate::types::{empty, full};
    use http::StatusCode;

    struct ParamsProbe;

    impl Backend for ParamsProbe {
        fn call<'a>(
            &'a self,
            ctx: &'a MiddlewareContext,
            request: Request,
        ) -> BoxFuture<'a, Result<Response, TransportError>> {
            Box::pin(async move {
                let status = match ctx.get_extension::<EncryptionParams>() {
                    Some(params) if params.resolve(&request).is_ok() => StatusCode::OK,
                    Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    None => StatusCode::SERVICE_UNAVAILABLE,
                };
                let mut response = http::Response::new(full(""));
                *response.status_mut() = status;
                Ok(response)
            })
        }
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/v1/a/c/o")
            .body(empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_publishes_params() {
        let material = KeyMaterial::key(vec![1u8; 32]).unwrap();
        let middleware = KeyManagementMiddleware::with_static_key(material);
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(&mut ctx, request(), Next::backend(&ParamsProbe))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(ctx.has_extension::<EncryptionParams>());
    }

    #[tokio::test]
    async fn test_closure_key_source() {
        let middleware = KeyManagementMiddleware::new(|request: &Request| {
            if request.uri().path().ends_with("/o") {
                KeyMaterial::key(vec![2u8; 32])
            } else {
                Err(KeyFormatError::Source("unknown object".to_string()))
            }
        });
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(&mut ctx, request(), Next::backend(&ParamsProbe))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let other = http::Request::builder()
            .uri("/v1/a/c/other")
            .body(empty())
            .unwrap();
        let response = middleware
            .process(&mut ctx, other, Next::backend(&ParamsProbe))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_middleware_name() {
        let material = KeyMaterial::key(vec![1u8; 16]).unwrap();
        assert_eq!(
            KeyManagementMiddleware::with_static_key(material).name(),
            "key_management"
        );
    }
}
