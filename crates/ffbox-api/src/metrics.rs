//! Prometheus metrics for the API server.
//!
//! The media and storage crates record their own series through the global
//! `metrics` recorder; this module installs the recorder and owns the
//! HTTP-level series.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Buckets for request latency. Processing requests run for minutes.
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.25, 1.0, 5.0, 15.0, 60.0, 180.0, 600.0];

/// Label for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "ffbox_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "ffbox_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "ffbox_http_requests_in_flight";
    pub const DOWNLOADS_TOTAL: &str = "ffbox_downloads_total";
    pub const CLEANUP_SWEEPS_TOTAL: &str = "ffbox_cleanup_sweeps_total";
    pub const CLEANUP_DELETED_TOTAL: &str = "ffbox_cleanup_deleted_total";
    pub const CLEANUP_ERRORS_TOTAL: &str = "ffbox_cleanup_errors_total";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "ffbox_rate_limit_hits_total";
}

/// Install the global Prometheus recorder and return its render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )?
        .install_recorder()
}

pub fn record_download(auto_delete: bool) {
    counter!(names::DOWNLOADS_TOTAL, "auto_delete" => auto_delete.to_string()).increment(1);
}

pub fn record_cleanup_sweep(deleted: usize, errors: usize) {
    counter!(names::CLEANUP_SWEEPS_TOTAL).increment(1);
    counter!(names::CLEANUP_DELETED_TOTAL).increment(deleted as u64);
    counter!(names::CLEANUP_ERRORS_TOTAL).increment(errors as u64);
}

pub fn record_rate_limit_hit(route: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "route" => route.to_string()).increment(1);
}

/// Route template for a request, so artifact names never become labels.
pub fn route_label<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Count, time and track in-flight HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let route = route_label(&request);
    let started = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    // Also decrements when the client disconnects mid-request
    let _in_flight = scopeguard::guard((), |_| {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    });

    let response = next.run(request).await;

    let labels = [
        ("method", method),
        ("route", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(started.elapsed().as_secs_f64());

    response
}
