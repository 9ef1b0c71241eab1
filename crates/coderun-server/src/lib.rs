//! HTTP gateway for running code snippets in single-use containers
//!
//! This crate exposes a [`CodeRunner`] over HTTP. `POST /run` takes
//! `{"language": ..., "code": ...}` and answers with the sanitized output as
//! plain text, or with a 500 and the error message when execution fails.
//! The gateway holds no state of its own; every request is forwarded to the
//! runner, which owns admission control and container teardown.

pub mod error;

pub use error::{Result, ServerError};

use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, Json as AxumJson, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, options, post};
use axum::{middleware, Router};
use coderun_core::{ExecutionError, Runner};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// A supported language and the image it runs in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageInfo {
    pub language: String,
    pub image: String,
}

/// Body of `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub language: String,
    pub code: String,
}

/// Executes code on behalf of the gateway.
#[async_trait]
pub trait CodeRunner: Send + Sync + Clone + 'static {
    /// Runs `code` and returns its sanitized output.
    async fn execute(&self, language: &str, code: &str)
        -> std::result::Result<String, ExecutionError>;

    /// Languages this runner accepts.
    fn languages(&self) -> Vec<LanguageInfo>;
}

#[async_trait]
impl CodeRunner for Runner {
    async fn execute(
        &self,
        language: &str,
        code: &str,
    ) -> std::result::Result<String, ExecutionError> {
        Runner::execute(self, language, code).await
    }

    fn languages(&self) -> Vec<LanguageInfo> {
        self.registry()
            .profiles()
            .map(|profile| LanguageInfo {
                language: profile.identifier.clone(),
                image: profile.image.clone(),
            })
            .collect()
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            enable_cors: true,
            cors_origins: None,
            max_body_size: 1024 * 1024, // 1MB
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState<T: CodeRunner> {
    pub runner: T,
}

/// Handler for the /run POST endpoint.
async fn run_handler<T: CodeRunner>(
    State(app_state): State<AppState<T>>,
    AxumJson(request): AxumJson<RunRequest>,
) -> Response {
    log::info!("Received request to run {} code", request.language);

    match app_state
        .runner
        .execute(&request.language, &request.code)
        .await
    {
        Ok(output) => {
            log::info!("Code ran successfully. Output: {}", output);
            (StatusCode::OK, output).into_response()
        }
        Err(e) if e.is_client_error() => {
            log::warn!("Rejected {} request: {}", request.language, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            log::error!("Failed to run {} code: {}", request.language, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Handler for the /languages GET endpoint.
async fn languages_handler<T: CodeRunner>(
    State(app_state): State<AppState<T>>,
) -> Json<Vec<LanguageInfo>> {
    Json(app_state.runner.languages())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// The coderun HTTP server.
pub struct CodeServer<T: CodeRunner> {
    runner: T,
    config: ServerConfig,
}

impl<T: CodeRunner> CodeServer<T> {
    /// Create a new server with the given runner and default configuration.
    pub fn new(runner: T) -> Self {
        Self {
            runner,
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(runner: T, config: ServerConfig) -> Self {
        Self { runner, config }
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            runner: self.runner.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/languages", get(languages_handler::<T>))
            .route("/run", post(run_handler::<T>))
            // CORS preflight
            .route("/run", options(|| async { StatusCode::OK }))
            .route("/languages", options(|| async { StatusCode::OK }))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async move {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // Health probes are frequent; keep them out of the info log
                    if uri.path() == "/health" {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    log::debug!(
                        "Response {} {} completed in {:?}",
                        request_id,
                        response.status(),
                        start.elapsed()
                    );

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = match self.config.cors_origins {
                Some(ref origins) => {
                    let origins: std::result::Result<Vec<HeaderValue>, _> =
                        origins.iter().map(|s| s.parse::<HeaderValue>()).collect();
                    match origins {
                        Ok(origins) => CorsLayer::new()
                            .allow_origin(origins)
                            .allow_methods(Any)
                            .allow_headers(Any),
                        Err(e) => {
                            log::warn!("Invalid CORS origin ({}), allowing any origin", e);
                            CorsLayer::permissive()
                        }
                    }
                }
                None => CorsLayer::permissive(),
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server; it shuts down when `shutdown_signal` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = match TcpListener::bind(self.config.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("Failed to bind to {}: {}", self.config.bind_addr, e);
                return Err(e.into());
            }
        };

        log::info!("Server listening on http://{}", self.config.bind_addr);
        log::info!("Run endpoint: http://{}/run", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
