//! Application startup and lifecycle management.
//!
//! Builds the backend once from configuration, runs the startup diagnostics,
//! binds the listener and serves the router until a shutdown signal arrives.

use crate::config::{BackendConfig, BackendKind, GatewayConfig, GatewayVariant};
use crate::handlers::{chat, completions, not_found, status};
use crate::services::bridge::SubprocessBackend;
use crate::services::diagnostics::startup_self_test;
use crate::services::{GpuProbe, InferenceBackend};
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{cors_middleware, make_request_span, request_id_middleware};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub backend: Arc<dyn InferenceBackend>,
    pub gpu_probe: GpuProbe,
}

impl AppState {
    pub fn new(config: GatewayConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let gpu_probe = GpuProbe::new(config.diagnostics.gpu_probe_command.clone());
        Self {
            config: Arc::new(config),
            backend,
            gpu_probe,
        }
    }
}

/// Router for the configured variant.
///
/// `/status` is always mounted; the generation endpoint depends on the
/// variant. Unknown paths and methods fall through to a JSON 404.
pub fn build_router(state: AppState) -> Router {
    let generation = match state.config.variant {
        GatewayVariant::Completions => Router::new().route(
            "/v1/completions",
            post(completions).fallback(not_found),
        ),
        GatewayVariant::Chat => Router::new().route("/chat", post(chat).fallback(not_found)),
    };

    Router::new()
        // GET handlers also answer HEAD unless HEAD is routed explicitly.
        .route("/status", get(status).head(not_found).fallback(not_found))
        .merge(generation)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(cors_middleware))
        .with_state(state)
}

/// Construct the backend selected by configuration.
pub fn build_backend(config: &GatewayConfig) -> Result<Arc<dyn InferenceBackend>, AppError> {
    match config.backend.kind {
        BackendKind::Subprocess => {
            let backend = SubprocessBackend::from_config(&config.backend).ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "LLAMA_CLI_PATH is required for the subprocess backend"
                ))
            })?;
            Ok(Arc::new(backend))
        }
        BackendKind::Embedded => build_embedded_backend(&config.backend),
    }
}

#[cfg(feature = "llama-cpp")]
fn build_embedded_backend(config: &BackendConfig) -> Result<Arc<dyn InferenceBackend>, AppError> {
    use crate::services::bridge::llama_cpp::LlamaCppRuntime;
    use crate::services::bridge::EmbeddedBackend;

    let runtime = LlamaCppRuntime::load(&config.model_path, config.n_gpu_layers).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "Failed to load model {}: {}",
            config.model_path.display(),
            e
        ))
    })?;

    Ok(Arc::new(
        EmbeddedBackend::new(runtime).with_timeout(config.timeout),
    ))
}

#[cfg(not(feature = "llama-cpp"))]
fn build_embedded_backend(_config: &BackendConfig) -> Result<Arc<dyn InferenceBackend>, AppError> {
    Err(AppError::ConfigError(anyhow::anyhow!(
        "The embedded backend requires building with the `llama-cpp` feature"
    )))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Validate the configuration, build the backend and bind the listener.
    pub async fn build(config: GatewayConfig) -> Result<Self, AppError> {
        config.validate()?;
        let backend = build_backend(&config)?;
        Self::build_with_backend(config, backend).await
    }

    /// Build around an already constructed backend.
    pub async fn build_with_backend(
        config: GatewayConfig,
        backend: Arc<dyn InferenceBackend>,
    ) -> Result<Self, AppError> {
        tracing::info!(
            variant = %config.variant,
            backend = backend.name(),
            model = %config.backend.model_path.display(),
            cli = ?config.backend.cli_path,
            "Initialized inference backend"
        );

        let state = AppState::new(config, backend);

        state.gpu_probe.log_startup_gpu_info().await;
        if state.config.diagnostics.startup_self_test {
            startup_self_test(state.backend.as_ref()).await;
        }

        // Port 0 = random port for testing
        let address = format!("{}:{}", state.config.common.host, state.config.port());
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Starting llama.cpp API server on port {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down server...");
}
