//! Upstream request execution.
//!
//! All calls go to one fixed base URL through a single pooled
//! `reqwest::Client` built at startup. This module owns the status check:
//! anything outside 2xx comes back as [`AppError::Upstream`] with the body
//! untouched, so handlers never see a failed upstream response.

use crate::api::headers::{transform_headers, OutboundHeaders};
use crate::api::models::UpstreamModelList;
use crate::core::config::AppConfig;
use crate::core::error::{AppError, Result};
use crate::core::logging::get_request_id;
use crate::core::metrics::get_metrics;
use anyhow::Context;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// Upstream catalog endpoint.
pub const MODELS_PATH: &str = "/api/v1/models";

/// Upstream chat completions endpoint.
pub const CHAT_COMPLETIONS_PATH: &str = "/api/v1/chat/completions";

/// Sent upstream unless the caller supplied its own `User-Agent`.
pub const USER_AGENT: &str = "OpenRouter-Proxy/1.0";

/// A fully-read successful upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Client for the single upstream provider.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    host: String,
    api_key: Option<String>,
}

/// Create HTTP client with connection pooling.
pub fn create_http_client(config: &AppConfig) -> anyhow::Result<reqwest::Client> {
    if !config.upstream.verify_ssl {
        tracing::warn!("TLS certificate verification for upstream requests is DISABLED");
    }

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!config.upstream.verify_ssl)
        .connect_timeout(Duration::from_secs(config.upstream.connect_timeout_secs))
        .timeout(Duration::from_secs(config.upstream.request_timeout_secs))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

impl UpstreamClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::with_http_client(config, create_http_client(config)?))
    }

    pub fn with_http_client(config: &AppConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: config.upstream.base_url.trim_end_matches('/').to_string(),
            host: config.upstream_host(),
            api_key: config.upstream.api_key.clone(),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Apply the header transform for this upstream.
    pub fn outbound_headers(&self, inbound: &HeaderMap) -> OutboundHeaders {
        transform_headers(inbound, &self.host, self.api_key())
    }

    /// Fetch the raw upstream catalog.
    pub async fn list_models(
        &self,
        headers: &OutboundHeaders,
        timeout: Option<Duration>,
    ) -> Result<UpstreamModelList> {
        let response = self
            .send(reqwest::Method::GET, MODELS_PATH, headers, None, timeout)
            .await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Forward a non-streaming chat completion and read the whole body.
    pub async fn chat_completion(
        &self,
        headers: &OutboundHeaders,
        body: Bytes,
    ) -> Result<UpstreamResponse> {
        let response = self
            .send(
                reqwest::Method::POST,
                CHAT_COMPLETIONS_PATH,
                headers,
                Some(body),
                None,
            )
            .await?;
        let status = convert_status(response.status());
        let content_type = content_type(&response);
        let body = response.bytes().await?;
        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    /// Forward a streaming chat completion.
    ///
    /// Returns as soon as response headers are in; the body is left as an
    /// open byte stream for the re-streamer.
    pub async fn chat_completion_stream(
        &self,
        headers: &OutboundHeaders,
        body: Bytes,
    ) -> Result<reqwest::Response> {
        self.send(
            reqwest::Method::POST,
            CHAT_COMPLETIONS_PATH,
            headers,
            Some(body),
            None,
        )
        .await
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        headers: &OutboundHeaders,
        body: Option<Bytes>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        log_outbound_request(&method, &url, headers, body.as_deref());

        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(headers.to_reqwest());
        if let Some(body) = body {
            request = request.body(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            tracing::error!(
                request_id = %get_request_id(),
                url = %url,
                method = %method,
                error = %crate::core::error::describe_error(&e),
                is_timeout = e.is_timeout(),
                is_connect = e.is_connect(),
                "HTTP request failed to upstream"
            );
            AppError::from(e)
        })?;

        get_metrics()
            .upstream_latency
            .with_label_values(&[path])
            .observe(start.elapsed().as_secs_f64());

        let status = response.status();
        tracing::debug!(
            request_id = %get_request_id(),
            url = %url,
            method = %method,
            status = %status,
            "HTTP request completed"
        );

        if status.is_success() {
            return Ok(response);
        }

        let status = convert_status(status);
        let content_type = content_type(&response);
        let body = response.bytes().await?;
        Err(AppError::Upstream {
            status,
            content_type,
            body,
        })
    }
}

/// Log an outbound call with the credential masked.
fn log_outbound_request(
    method: &reqwest::Method,
    url: &str,
    headers: &OutboundHeaders,
    body: Option<&[u8]>,
) {
    tracing::info!(
        request_id = %get_request_id(),
        method = %method,
        url = %url,
        "Sending request to upstream"
    );
    tracing::debug!(
        request_id = %get_request_id(),
        headers = ?headers.masked(),
        body = %body.map(String::from_utf8_lossy).unwrap_or_default(),
        "Upstream request detail"
    );
}

/// Normalize reqwest status code into axum status code.
fn convert_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn content_type(response: &reqwest::Response) -> Option<HeaderValue> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
}
