//! HTTP request handlers for the API endpoints.

use crate::api::catalog::{filter_catalog, AllowList};
use crate::api::models::{
    ConnectionTestFailure, ConnectionTestResponse, HealthResponse, InboundBody, ModelList,
};
use crate::api::streaming::create_sse_response;
use crate::api::upstream::UpstreamClient;
use crate::core::config::AppConfig;
use crate::core::error::{AppError, Result};
use crate::core::logging::get_request_id;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on the connectivity self-test.
pub const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self { config, upstream })
    }

    pub fn with_upstream(config: AppConfig, upstream: UpstreamClient) -> Self {
        Self { config, upstream }
    }
}

/// Accept `application/json` with or without parameters.
fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Handle model listing requests.
///
/// The allow-list is read fresh on every call.
#[tracing::instrument(skip(state, headers), fields(request_id = %get_request_id()))]
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ModelList>> {
    let outbound = state.upstream.outbound_headers(&headers);
    let catalog = state.upstream.list_models(&outbound, None).await?;
    let upstream_count = catalog.data.len();

    let allow_list = AllowList::load(state.config.model_filter_file.as_deref()).await;
    let data = filter_catalog(catalog.data, &allow_list);

    tracing::info!(
        upstream_count = upstream_count,
        returned_count = data.len(),
        filtered = !allow_list.is_empty(),
        "Model list served"
    );

    Ok(Json(ModelList::new(data)))
}

/// Handle chat completion requests.
///
/// Checks run in a fixed order: content type, body shape, then the
/// server-held credential. Nothing is sent upstream unless all three pass.
#[tracing::instrument(skip(state, headers, body), fields(request_id = %get_request_id()))]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    if !is_json_content_type(&headers) {
        return Err(AppError::BadRequest(
            "Content-Type must be application/json".to_string(),
        ));
    }

    let inbound = InboundBody::chat(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    if !state.upstream.has_api_key() {
        return Err(AppError::MissingApiKey);
    }

    let outbound = state.upstream.outbound_headers(&headers);

    match inbound {
        InboundBody::ChatRequest { stream: true, raw } => {
            tracing::debug!("Forwarding streaming chat completion");
            let response = state.upstream.chat_completion_stream(&outbound, raw).await?;
            Ok(create_sse_response(response, get_request_id()))
        }
        InboundBody::ChatRequest { stream: false, raw } => {
            tracing::debug!("Forwarding chat completion");
            let response = state.upstream.chat_completion(&outbound, raw).await?;
            let content_type = response
                .content_type
                .unwrap_or_else(|| HeaderValue::from_static("application/json"));
            Ok((
                response.status,
                [(header::CONTENT_TYPE, content_type)],
                Body::from(response.body),
            )
                .into_response())
        }
        InboundBody::ModelsQuery => Err(AppError::Internal(
            "Unexpected request body for chat completions".to_string(),
        )),
    }
}

/// Basic health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Upstream connectivity self-test.
///
/// Lists models with only the server credential attached and reports how
/// many came back.
#[tracing::instrument(skip(state), fields(request_id = %get_request_id()))]
pub async fn test_connection(State(state): State<Arc<AppState>>) -> Result<Response> {
    if !state.upstream.has_api_key() {
        return Err(AppError::MissingApiKey);
    }

    let outbound = state.upstream.outbound_headers(&HeaderMap::new());
    match state
        .upstream
        .list_models(&outbound, Some(CONNECTION_TEST_TIMEOUT))
        .await
    {
        Ok(catalog) => {
            tracing::info!(model_count = catalog.data.len(), "Connection test succeeded");
            Ok(Json(ConnectionTestResponse {
                status: "connected".to_string(),
                model_count: catalog.data.len(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
            .into_response())
        }
        Err(e) => {
            let category = e.category();
            let details = match &e {
                AppError::Upstream { body, .. } if !body.is_empty() => {
                    format!("{}: {}", e, String::from_utf8_lossy(body))
                }
                _ => e.to_string(),
            };
            tracing::error!(
                error = %details,
                error_category = %category,
                "Connection test failed"
            );
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ConnectionTestFailure {
                    error: "Connection test failed".to_string(),
                    details,
                    code: Some(category.as_str().to_string()),
                }),
            )
                .into_response())
        }
    }
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}
