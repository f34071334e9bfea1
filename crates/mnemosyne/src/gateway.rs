//! Pipeline assembly from configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mnemosyne_config::MnemosyneConfig;
use mnemosyne_core::{GatewayError, KeyMaterial};
use mnemosyne_middleware::context::MiddlewareContext;
use mnemosyne_middleware::manifest::Clock;
use mnemosyne_middleware::stages::{
    EncryptionMiddleware, InfoMiddleware, KeyManagementMiddleware, RevisionsMiddleware,
};
use mnemosyne_middleware::{Backend, HttpBackend, Pipeline, Request, Response};

/// The assembled gateway.
///
/// Stages are installed in a fixed order, each only when enabled:
///
/// ```text
/// info → key_management → revisions → encryption → backing store
/// ```
///
/// # Example
///
/// ```ignore
/// let config = ConfigLoader::new().with_env_prefix("MNEMOSYNE").load()?;
/// let gateway = Gateway::from_config(&config)?;
///
/// let response = gateway.handle(request).await;
/// ```
#[derive(Debug, Clone)]
pub struct Gateway {
    pipeline: Pipeline,
}

impl Gateway {
    /// Builds a gateway forwarding to the configured HTTP backing store.
    pub fn from_config(config: &MnemosyneConfig) -> Result<Self, GatewayError> {
        Self::builder(config).build()
    }

    /// Creates a builder for finer control over the backend and clock.
    pub fn builder(config: &MnemosyneConfig) -> GatewayBuilder {
        GatewayBuilder {
            config: config.clone(),
            backend: None,
            clock: None,
        }
    }

    /// Processes one request.
    pub async fn handle(&self, request: Request) -> Response {
        self.pipeline.process(request).await
    }

    /// Processes one request with a caller-supplied context.
    pub async fn handle_with_context(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
    ) -> Response {
        self.pipeline.process_with_context(ctx, request).await
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// Builder for a [`Gateway`].
#[must_use]
pub struct GatewayBuilder {
    config: MnemosyneConfig,
    backend: Option<Arc<dyn Backend>>,
    clock: Option<Clock>,
}

impl GatewayBuilder {
    /// Uses `backend` instead of an HTTP client for the configured URL.
    pub fn backend(mut self, backend: impl Backend) -> Self {
        self.backend = Some(Arc::new(backend));
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

    /// Validates the configuration and assembles the pipeline.
    ///
    /// Every failure here is a [`GatewayError::Configuration`].
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = &self.config;
        config
            .validate()
            .map_err(|e| GatewayError::configuration(e.to_string()))?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(
                HttpBackend::new(&config.backend.url)
                    .map_err(|e| GatewayError::configuration(e.to_string()))?,
            ) as Arc<dyn Backend>,
        };

        let info = config
            .info
            .enabled
            .then(|| InfoMiddleware::new(config.info.path.clone()));

        let key_management = match config.key_management.key.as_deref() {
            Some(key) if config.key_management.enabled => {
                let material = KeyMaterial::parse(key).map_err(|e| {
                    GatewayError::configuration(format!("key_management.key: {e}"))
                })?;
                Some(KeyManagementMiddleware::with_static_key(material))
            }
            _ => None,
        };

        let revisions = config.revisions.enabled.then(|| {
            let builder = match self.clock {
                Some(clock) => RevisionsMiddleware::builder().clock(move || clock()),
                None => RevisionsMiddleware::builder(),
            };
            builder.build()
        });

        let encryption = if config.encryption.enabled {
            Some(
                EncryptionMiddleware::new(&config.encryption.algorithm, &config.encryption.mode)
                    .map_err(|e| GatewayError::configuration(e.to_string()))?,
            )
        } else {
            None
        };

        let pipeline = Pipeline::builder_shared(backend)
            .optional_stage(info)
            .optional_stage(key_management)
            .optional_stage(revisions)
            .optional_stage(encryption)
            .build();

        tracing::info!(stages = ?pipeline.stage_names(), "Gateway assembled");
        Ok(Gateway { pipeline })
    }
}
