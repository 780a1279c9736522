//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ffbox_api::{create_router, metrics, ApiConfig, AppState, CleanupScheduler};
use ffbox_media::{check_ffmpeg, check_ffprobe};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ffbox=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting ffbox-api");

    let config = ApiConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        temp_dir = %config.media.temp_dir.display(),
        max_file_size = config.media.max_file_size,
        retention_secs = config.file_retention.as_secs(),
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        api_keys_configured = config.auth_enabled(),
        base_url = config.media.base_url.as_deref().unwrap_or("not set"),
        "API config"
    );

    match (check_ffmpeg(), check_ffprobe()) {
        (Ok(ffmpeg), Ok(ffprobe)) => {
            info!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "Media tools found")
        }
        (ffmpeg, ffprobe) => warn!(
            ffmpeg = ffmpeg.is_ok(),
            ffprobe = ffprobe.is_ok(),
            "Media tools missing from PATH; processing requests will fail"
        ),
    }

    let state = match AppState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {:#}", e);
            std::process::exit(1);
        }
    };

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    // Start artifact expiry background task
    let cleanup = CleanupScheduler::new(
        Arc::clone(&state.registry),
        config.cleanup_interval,
        config.retention(),
    );
    tokio::spawn(async move {
        cleanup.run().await;
    });

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address {}:{}: {}", config.host, config.port, e);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("Server error: {}", e);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
