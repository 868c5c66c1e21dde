//! Application startup and lifecycle management.

use crate::config::ClassifierConfig;
use crate::handlers::{classify_email, health_check};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::TextProvider;
use crate::services::EmailClassifier;
use axum::{
    extract::DefaultBodyLimit,
    http::{Method, Uri},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    cors::permissive_cors, panic::catch_panic_layer, tracing::http_trace_layer,
    tracing::request_id_middleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ClassifierConfig>,
    pub classifier: EmailClassifier,
}

impl AppState {
    pub fn new(config: ClassifierConfig, provider: Option<Arc<dyn TextProvider>>) -> Self {
        let classifier =
            EmailClassifier::new(provider).with_params(config.gemini.generation_params());
        Self {
            config: Arc::new(config),
            classifier,
        }
    }

    /// Wire the Gemini provider when a credential is configured. A missing
    /// credential is not an error.
    pub fn from_config(config: ClassifierConfig) -> Result<Self, AppError> {
        let provider: Option<Arc<dyn TextProvider>> =
            match GeminiConfig::from_settings(&config.gemini) {
                Some(gemini_config) => {
                    let provider = GeminiTextProvider::new(gemini_config)
                        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
                    tracing::info!(
                        model = %config.gemini.model,
                        "Initialized Gemini text provider"
                    );
                    Some(Arc::new(provider) as Arc<dyn TextProvider>)
                }
                None => {
                    tracing::warn!(
                        "GEMINI_API_KEY not set; classification requests will return an error result"
                    );
                    None
                }
            };

        Ok(Self::new(config, provider))
    }
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/classify",
            post(classify_email).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/health", get(health_check))
        .route("/health", get(health_check))
        .fallback(not_found)
        .with_state(state)
        .layer(catch_panic_layer())
        .layer(permissive_cors([Method::GET, Method::POST, Method::OPTIONS]))
        .layer(http_trace_layer())
        .layer(from_fn(request_id_middleware))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
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

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ClassifierConfig) -> Result<Self, AppError> {
        let port = config.common.port;
        let state = AppState::from_config(config)?;
        Self::with_state(state, port).await
    }

    /// Bind a listener for an already assembled state (port 0 = random port).
    pub async fn with_state(state: AppState, port: u16) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Classifier service listening on port {}", port);

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

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}
