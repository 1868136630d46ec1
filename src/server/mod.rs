//! HTTP surface: health check, the removal endpoint and the built UI assets

mod handlers;

use crate::{
    config::{RemovalMode, ServerConfig},
    error::{MatteError, Result},
    inference::DefaultBackendFactory,
    processor::MatteProcessor,
    remover::{BackgroundRemover, LocalRemover, RemoteRemover},
    services::{OutputFormatHandler, RemoveBgClient},
    shared_model::SharedModel,
};
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

pub use handlers::{GENERIC_ERROR_BODY, MISSING_IMAGE_BODY, PROXY_ERROR_BODY};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    remover: Arc<dyn BackgroundRemover>,
    mode: RemovalMode,
    content_type: &'static str,
    model: Option<SharedModel>,
}

impl AppState {
    /// State around an arbitrary remover
    #[must_use]
    pub fn new(remover: Arc<dyn BackgroundRemover>, mode: RemovalMode) -> Self {
        Self {
            remover,
            mode,
            content_type: "image/png",
            model: None,
        }
    }

    /// State serving cutouts from a local model
    #[must_use]
    pub fn local(model: SharedModel, processor: MatteProcessor) -> Self {
        let content_type = OutputFormatHandler::content_type(processor.config().output_format);
        Self {
            remover: Arc::new(LocalRemover::new(model.clone(), processor)),
            mode: RemovalMode::Local,
            content_type,
            model: Some(model),
        }
    }

    /// Build the state the configured mode needs
    ///
    /// # Errors
    /// - HTTP client construction failure in proxy mode
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        match config.mode() {
            RemovalMode::Local => {
                let model =
                    SharedModel::new(config.matte.clone(), Arc::new(DefaultBackendFactory));
                Ok(Self::local(model, MatteProcessor::new(config.matte.clone())))
            },
            RemovalMode::Proxy => {
                let client = RemoveBgClient::new(config.remove_bg.clone())?;
                Ok(Self::new(Arc::new(RemoteRemover::new(client)), RemovalMode::Proxy))
            },
        }
    }

    #[must_use]
    pub fn mode(&self) -> RemovalMode {
        self.mode
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("remover", &self.remover.name())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Routes for the given state and configuration
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route(
            "/api/removebg",
            axum::routing::post(handlers::remove_background).options(handlers::preflight),
        )
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    if let Some(dir) = config.static_dir.as_ref().filter(|dir| dir.is_dir()) {
        let index = dir.join("index.html");
        router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    } else if let Some(dir) = &config.static_dir {
        log::warn!("Static directory {} not found; UI assets will not be served", dir.display());
    }

    router.with_state(state)
}

/// Bind and serve until Ctrl-C
///
/// # Errors
/// - Invalid configuration
/// - Bind failure
pub async fn serve(config: ServerConfig) -> Result<()> {
    config.validate()?;
    let addr = config.socket_addr()?;
    let state = AppState::from_config(&config)?;

    if let Some(model) = state.model.clone() {
        // Warm the model so the first upload does not pay for loading
        tokio::spawn(async move {
            if let Err(e) = model.get().await {
                tracing::warn!(error = %e, "model warm-up failed; will retry on first request");
            }
        });
    }

    let app = router(state, &config);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MatteError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(%addr, mode = ?config.mode(), "PosterMaker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MatteError::internal(format!("Server error: {}", e)))?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
