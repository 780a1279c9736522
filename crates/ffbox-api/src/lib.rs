//! Axum HTTP API server.
//!
//! This crate provides:
//! - `/process`, `/info`, `/bgm` and `/concat` over JSON, forms or multipart
//! - Artifact downloads with optional delete-after-download
//! - API keys, rate limiting and security headers
//! - Background expiry of old artifacts
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{CleanupScheduler, SweepReport};
pub use state::AppState;
