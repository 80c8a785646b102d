//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, and latency.

use super::rate_limit::client_id;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// Health probe path; not logged to reduce noise.
const HEALTH_PATH: &str = "/";

/// Logs at INFO for completed requests and WARN for 5xx.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == HEALTH_PATH {
        return next.run(request).await;
    }

    let client = client_id(&request);
    let span = tracing::info_span!("http_request", method = %method, path = %path, client = %client);

    let start = Instant::now();
    let response = next.run(request).instrument(span).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status,
            latency_ms,
            client = %client,
            "Request failed (5xx)"
        );
    } else if status >= 400 {
        info!(
            method = %method,
            path = %path,
            status,
            latency_ms,
            client = %client,
            "Request completed (4xx)"
        );
    } else {
        info!(method = %method, path = %path, status, latency_ms, "Request completed");
    }

    response
}
