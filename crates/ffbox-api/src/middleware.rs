//! API middleware.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{redacted_response, ApiError, InternalDetail};
use crate::metrics;
use crate::state::AppState;

/// Header carrying the client's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the request id, echoed back on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client keys tracked before idle ones are pruned.
const MAX_TRACKED_CLIENTS: usize = 10_000;

const MAX_REQUEST_ID_LEN: usize = 128;

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Per-client request budget for the processing routes.
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl ClientRateLimiter {
    /// `requests_per_second` of zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_second(rps)),
        }
    }

    /// Consume one request from `ip`'s budget. Returns false when exhausted.
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiter.len() > MAX_TRACKED_CLIENTS {
            // Drops keys whose budget has fully refilled
            self.limiter.retain_recent();
            debug!(remaining = self.limiter.len(), "Pruned idle rate limit keys");
        }
        self.limiter.check_key(&ip).is_ok()
    }
}

/// CORS for browser clients. `*` (or nothing) allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let wildcard = origins.is_empty() || origins.iter().any(|o| o == "*");
    let allow_origin = if wildcard {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring unparsable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_DISPOSITION,
            header::CONTENT_LENGTH,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .max_age(Duration::from_secs(600))
}

/// Add fixed hardening headers to every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

/// Accept a sane caller-supplied id, otherwise mint one. Everything the request
/// logs afterwards is inside a span carrying it.
pub async fn request_id(request: Request<Body>, next: Next) -> Response<Body> {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Replace internal error messages with a generic one when `production` is set.
pub async fn redact_internal_errors(
    State(production): State<bool>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let response = next.run(request).await;
    if production && response.extensions().get::<InternalDetail>().is_some() {
        return redacted_response(response.status());
    }
    response
}

/// One line per finished request. Health probes are not logged.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );
    response
}

/// Reject clients over their budget with 429 and `Retry-After`.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<ClientRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(ip) = client_ip(&request) else {
        return next.run(request).await;
    };

    if limiter.check(ip) {
        return next.run(request).await;
    }

    let route = metrics::route_label(&request);
    warn!(ip = %ip, route = %route, "Rate limit exceeded");
    metrics::record_rate_limit_hit(&route);
    let mut response = ApiError::RateLimited.into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    response
}

/// Gate processing routes on `X-API-Key` when keys are configured.
///
/// A missing key is 401, an unknown key is 403.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if !state.config.auth_enabled() {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    match provided {
        None => {
            warn!(path = %request.uri().path(), "Request without API key");
            ApiError::unauthorized("API key required").into_response()
        }
        Some(key) if !state.config.api_keys.iter().any(|k| k == key) => {
            warn!(path = %request.uri().path(), "Request with unknown API key");
            ApiError::forbidden("Invalid API key").into_response()
        }
        Some(_) => next.run(request).await,
    }
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer.
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    header_ip(request.headers(), "x-forwarded-for")
        .or_else(|| header_ip(request.headers(), "x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}
