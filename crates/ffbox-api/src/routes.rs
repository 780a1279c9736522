//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    bgm, concat, download, edit, health, index, info, not_found, process, subtitle,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, redact_internal_errors, request_id, request_logging,
    require_api_key, security_headers, ClientRateLimiter,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Work endpoints: API key and per-IP rate limit
    let mut processing_routes = Router::new()
        .route("/process", post(process))
        .route("/info", post(info))
        .route("/bgm", post(bgm))
        .route("/concat", post(concat))
        .route("/subtitle", post(subtitle))
        .route("/edit", post(edit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    if state.config.rate_limit_rps > 0 {
        let rate_limiter = Arc::new(ClientRateLimiter::new(state.config.rate_limit_rps));
        processing_routes = processing_routes.layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));
    }

    let public_routes = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/download/:filename", get(download));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(processing_routes)
        .merge(public_routes)
        .merge(metrics_routes)
        .fallback(not_found)
        // Uploads are capped by the acquirer; this bounds the whole body
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size()))
        .layer(middleware::from_fn_with_state(
            state.config.is_production(),
            redact_internal_errors,
        ))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
