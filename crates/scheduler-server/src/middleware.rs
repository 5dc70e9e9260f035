//! Ambient HTTP middleware. Trimmed to what §6/§7 actually call for:
//! request correlation, structured access logging, CORS, compression
//! and a body-size cap — no auth, tenancy, rate limiting or bot
//! detection layers, since none of that is in scope for this surface.

use axum::{
    body::Body,
    http::{header, Method, Request},
    middleware::Next,
    response::Response,
};
use scheduler_core::config::CorsConfig;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Request ID wrapper, stashed in request extensions for `request_logging`.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "x-request-id",
        request_id
            .parse()
            .unwrap_or_else(|_| "unknown".parse().unwrap()),
    );
    response
}

pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let span = tracing::info_span!("request", request_id = %request_id, method = %method, uri = %uri);
    let response = {
        let _guard = span.enter();
        next.run(request).await
    };

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();
    if status.is_server_error() {
        warn!(request_id = %request_id, %method, %uri, status = status.as_u16(), duration_ms, "request completed with error");
    } else {
        info!(request_id = %request_id, %method, %uri, status = status.as_u16(), duration_ms, "request completed");
    }
    response
}

/// Builds the CORS layer from `ALLOWED_ORIGINS` (§6). `"*"` or an empty
/// list permits any origin; otherwise only the listed origins are
/// reflected back.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_origin = if config.allow_any() {
        AllowOrigin::any()
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, "x-request-id".parse().unwrap()])
        .expose_headers(["x-request-id".parse().unwrap()])
}

pub fn compression_layer() -> tower_http::compression::CompressionLayer {
    tower_http::compression::CompressionLayer::new()
}

/// Caps request bodies at `ServerConfig.max_body_size_bytes`, ahead of
/// the payload sanitizer's own serialized-size check in the Coordinator.
pub fn body_limit_layer(max_bytes: usize) -> tower_http::limit::RequestBodyLimitLayer {
    tower_http::limit::RequestBodyLimitLayer::new(max_bytes)
}
