//! Health check handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use ffbox_media::{check_ffmpeg, check_ffprobe};
use serde::Serialize;

use crate::error::ApiError;
use crate::response::{success, Envelope};
use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub ffmpeg_available: bool,
    pub ffprobe_available: bool,
    pub artifacts: usize,
}

/// Health check endpoint (liveness probe).
pub async fn health(State(state): State<AppState>) -> Json<Envelope<HealthResponse>> {
    success(
        "Service is healthy",
        HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
            ffmpeg_available: check_ffmpeg().is_ok(),
            ffprobe_available: check_ffprobe().is_ok(),
            artifacts: state.registry.len().await,
        },
    )
}

/// Service index.
#[derive(Serialize)]
pub struct IndexResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

pub const ENDPOINTS: &[&str] = &[
    "GET /health",
    "POST /process",
    "POST /info",
    "POST /bgm",
    "POST /concat",
    "POST /subtitle",
    "POST /edit",
    "GET /download/{filename}",
];

pub async fn index() -> Json<Envelope<IndexResponse>> {
    success(
        "ffbox media service",
        IndexResponse {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            endpoints: ENDPOINTS.to_vec(),
        },
    )
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Endpoint not found")
}
