//! OpenRouter Proxy - An OpenAI-compatible reverse proxy for OpenRouter
//!
//! The proxy exposes the OpenAI model-listing and chat-completion endpoints,
//! re-injects a server-held API key, and forwards everything to a single
//! upstream:
//!
//! - **Header rewriting**: caller credentials and hop-by-hop headers are
//!   stripped; `Host` and `Authorization` are set for the upstream
//! - **Model allow-list**: optional file narrowing the served catalog
//! - **Streaming Support**: Server-Sent Events re-framed line by line, with
//!   provider keep-alive comments removed
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! - [`core`]: Core functionality (config, errors, logging, metrics, middleware)
//! - [`api`]: HTTP handlers, upstream client, streaming and models
//!
//! # Configuration
//!
//! Read from the environment (a `.env` file is loaded first if present):
//! - `OPENROUTER_API_KEY`: Upstream API key (required for chat completions)
//! - `MODEL_FILTER_FILE`: Path to a line-delimited model allow-list
//! - `DISABLE_SSL_VERIFY`: Skip upstream TLS verification (default: false)
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `OPENROUTER_BASE_URL`: Upstream base URL (default: https://openrouter.ai)
//! - `REQUEST_TIMEOUT_SECS`: Upstream request timeout in seconds (default: 300)
//! - `CONNECT_TIMEOUT_SECS`: Upstream connect timeout in seconds (default: 10)

pub mod api;
pub mod core;

use axum::{
    routing::{get, post},
    Router,
};
use crate::api::{chat_completions, health, list_models, metrics_handler, test_connection};
use crate::core::{request_id_middleware, MetricsMiddleware};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// Re-export commonly used types for convenience
pub use crate::api::{AppState, UpstreamClient};
pub use crate::core::{AppConfig, AppError, Result};

/// Build router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/test-connection", get(test_connection))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .with_state(state);

    Router::new()
        .merge(api_routes)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
