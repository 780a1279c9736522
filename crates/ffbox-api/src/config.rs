//! API configuration.

use std::time::Duration;

use ffbox_media::MediaConfig;
use tracing::warn;

/// Slack on top of `MAX_FILE_SIZE` for multipart framing and form fields.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second per client IP (0 disables)
    pub rate_limit_rps: u32,
    /// Accepted `X-API-Key` values (empty disables the check)
    pub api_keys: Vec<String>,
    /// How long artifacts are kept
    pub file_retention: Duration,
    /// Time between cleanup sweeps
    pub cleanup_interval: Duration,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
    /// Environment (development/production)
    pub environment: String,
    /// Acquisition and processing settings
    pub media: MediaConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            api_keys: Vec::new(),
            file_retention: Duration::from_secs(2 * 3600),
            cleanup_interval: Duration::from_secs(30 * 60),
            metrics_enabled: true,
            environment: "development".to_string(),
            media: MediaConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            api_keys: std::env::var("API_KEYS")
                .map(|s| parse_api_keys(&s))
                .unwrap_or_default(),
            file_retention: std::env::var("FILE_RETENTION_HOURS")
                .ok()
                .and_then(|raw| {
                    parse_duration_or_warn("FILE_RETENTION_HOURS", &raw, retention_from_hours)
                })
                .unwrap_or(defaults.file_retention),
            cleanup_interval: std::env::var("CLEANUP_INTERVAL_MINUTES")
                .ok()
                .and_then(|raw| {
                    parse_duration_or_warn("CLEANUP_INTERVAL_MINUTES", &raw, interval_from_minutes)
                })
                .unwrap_or(defaults.cleanup_interval),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            media: MediaConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Request body limit: the file cap plus room for the rest of the form.
    pub fn max_body_size(&self) -> usize {
        usize::try_from(self.media.max_file_size)
            .unwrap_or(usize::MAX)
            .saturating_add(BODY_LIMIT_SLACK)
    }

    /// Artifact retention as a chrono duration, for registry comparisons.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.file_retention).unwrap_or(chrono::Duration::MAX)
    }
}

/// Positive, finite hours. Anything else is `None`.
fn retention_from_hours(raw: &str) -> Option<Duration> {
    let hours = raw.trim().parse::<f64>().ok()?;
    if hours.is_nan() || hours <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(hours * 3600.0).ok()
}

/// Positive whole minutes that fit in a `Duration`.
fn interval_from_minutes(raw: &str) -> Option<Duration> {
    let minutes = raw.trim().parse::<u64>().ok().filter(|m| *m > 0)?;
    minutes.checked_mul(60).map(Duration::from_secs)
}

fn parse_duration_or_warn(
    var: &str,
    raw: &str,
    parse: fn(&str) -> Option<Duration>,
) -> Option<Duration> {
    let parsed = parse(raw);
    if parsed.is_none() {
        warn!(var, value = raw, "Ignoring invalid duration, using default");
    }
    parsed
}

fn parse_api_keys(raw: &str) -> Vec<String> {
    let mut keys: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    keys.sort();
    keys.dedup();
    keys
}
