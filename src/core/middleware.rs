//! HTTP middleware for request ids and request metrics.

use crate::core::logging::{generate_request_id, REQUEST_ID};
use crate::core::metrics::get_metrics;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Assign a request id, run the rest of the stack inside its task-local
/// scope, and echo it back on the response.
///
/// The id is never forwarded upstream (the header transformer runs on the
/// inbound headers, which this middleware leaves untouched).
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = generate_request_id();

    let mut response = REQUEST_ID
        .scope(request_id.clone(), async move { next.run(request).await })
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Metrics middleware for tracking request statistics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Record count, duration and in-flight gauge per endpoint.
    ///
    /// For streaming responses the duration covers time to response headers;
    /// stream lifetime is tracked by the re-streamer's own counters.
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        let endpoint = request.uri().path().to_string();
        let method = request.method().to_string();

        // Skip metrics endpoint itself to avoid recursion
        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let metrics = get_metrics();
        metrics
            .active_requests
            .with_label_values(&[&endpoint])
            .inc();

        let start = Instant::now();
        let response = next.run(request).await;
        let duration = start.elapsed().as_secs_f64();
        let status_code = response.status().as_u16().to_string();

        metrics
            .request_count
            .with_label_values(&[&method, &endpoint, &status_code])
            .inc();
        metrics
            .request_duration
            .with_label_values(&[&method, &endpoint])
            .observe(duration);
        metrics
            .active_requests
            .with_label_values(&[&endpoint])
            .dec();

        response
    }
}
