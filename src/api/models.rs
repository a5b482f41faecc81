//! API request and response models.
//!
//! Upstream payloads are kept opaque wherever the proxy only forwards them;
//! only the pieces the proxy inspects or reshapes get a concrete type.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A catalog entry as returned by the upstream `/api/v1/models`.
///
/// Upstream entries carry many more fields (pricing, context length, ...);
/// they are ignored. `created` is carried through as whatever JSON the
/// upstream sent, so one odd entry cannot fail the whole listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,

    #[serde(default = "default_created")]
    pub created: Value,
}

fn default_created() -> Value {
    Value::from(0)
}

/// Upstream catalog envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamModelList {
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

/// Model information in OpenAI format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: Value,
    pub owned_by: String,
}

/// OpenAI-format model listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelList {
    pub fn new(data: Vec<ModelInfo>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}

/// Request body as seen by the forwarder.
///
/// The chat payload is kept as the exact bytes the caller sent; only the
/// `stream` flag is read out of it.
#[derive(Debug, Clone)]
pub enum InboundBody {
    ChatRequest { stream: bool, raw: Bytes },
    ModelsQuery,
}

impl InboundBody {
    /// Parse a chat completion body, checking it is a JSON object.
    pub fn chat(raw: Bytes) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(&raw)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("expected a JSON object"));
        }
        let stream = value.get("stream").map(is_truthy).unwrap_or(false);
        Ok(InboundBody::ChatRequest { stream, raw })
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, InboundBody::ChatRequest { stream: true, .. })
    }
}

/// JSON truthiness for the `stream` flag.
///
/// Clients are not consistent about sending a real boolean, so `1`, `"true"`
/// and friends are accepted. Arrays and objects are truthy even when empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Basic health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Result of a successful upstream connectivity test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResponse {
    pub status: String,
    pub model_count: usize,
    pub timestamp: String,
}

/// Result of a failed upstream connectivity test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestFailure {
    pub error: String,
    pub details: String,
    pub code: Option<String>,
}
