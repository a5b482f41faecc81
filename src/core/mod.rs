//! Core functionality for the OpenRouter proxy.
//!
//! This module contains the cross-cutting pieces used by the API layer:
//! - Configuration management
//! - Error handling
//! - Logging and request ids
//! - Metrics collection
//! - HTTP middleware
//! - Stream cancellation

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;

// Re-export commonly used types
pub use cancel::StreamCancelHandle;
pub use config::{AppConfig, ServerConfig, UpstreamConfig};
pub use error::{AppError, ErrorCategory, Result};
pub use logging::{generate_request_id, get_request_id, init_tracing, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::{request_id_middleware, MetricsMiddleware};
