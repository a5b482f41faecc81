//! API layer for the OpenRouter proxy.
//!
//! This module contains the HTTP handlers, the request/response models, the
//! upstream client and the SSE re-streaming support.

pub mod catalog;
pub mod disconnect;
pub mod handlers;
pub mod headers;
pub mod models;
pub mod streaming;
pub mod upstream;

// Re-export commonly used types
pub use catalog::{filter_catalog, owned_by, AllowList};
pub use disconnect::DisconnectStream;
pub use handlers::{
    chat_completions, health, list_models, metrics_handler, test_connection, AppState,
};
pub use headers::{transform_headers, OutboundHeaders, MASKED_AUTHORIZATION};
pub use models::{HealthResponse, InboundBody, ModelEntry, ModelInfo, ModelList};
pub use streaming::{create_sse_response, restream, SseLineBuffer, PROCESSING_MARKER};
pub use upstream::{create_http_client, UpstreamClient, UpstreamResponse};
