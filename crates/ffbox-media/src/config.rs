//! Media processing configuration.

use std::path::PathBuf;
use std::time::Duration;

use ffbox_models::MediaKind;

pub const DEFAULT_TEMP_DIR: &str = "/tmp/videos";
/// 500 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 524_288_000;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

const DEFAULT_VIDEO_EXTENSIONS: &str = "mp4,avi,mov,mkv,flv,wmv,webm,m4v";
const DEFAULT_AUDIO_EXTENSIONS: &str = "mp3,wav,flac,aac,ogg,m4a,wma,opus";
const DEFAULT_VIDEO_OUTPUT_FORMATS: &str = "mp4,avi,mov,mkv,webm";
const DEFAULT_AUDIO_OUTPUT_FORMATS: &str = "mp3,wav,flac,aac,ogg,m4a,opus";

/// Media processing configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Directory for inputs and artifacts
    pub temp_dir: PathBuf,
    /// Byte cap for downloads and uploads
    pub max_file_size: u64,
    /// Whole-request timeout for remote downloads
    pub download_timeout: Duration,
    /// Kill an external process after this long (None = no limit)
    pub ffmpeg_timeout: Option<Duration>,
    pub allowed_video_extensions: Vec<String>,
    pub allowed_audio_extensions: Vec<String>,
    pub video_output_formats: Vec<String>,
    pub audio_output_formats: Vec<String>,
    /// Prefix for download URLs (None = relative URLs)
    pub base_url: Option<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            ffmpeg_timeout: None,
            allowed_video_extensions: parse_list(DEFAULT_VIDEO_EXTENSIONS),
            allowed_audio_extensions: parse_list(DEFAULT_AUDIO_EXTENSIONS),
            video_output_formats: parse_list(DEFAULT_VIDEO_OUTPUT_FORMATS),
            audio_output_formats: parse_list(DEFAULT_AUDIO_OUTPUT_FORMATS),
            base_url: None,
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            temp_dir: std::env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_TEMP_DIR)),
            max_file_size: std::env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_FILE_SIZE),
            download_timeout: Duration::from_secs(
                std::env::var("DOWNLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            ),
            ffmpeg_timeout: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            allowed_video_extensions: list_from_env(
                "ALLOWED_VIDEO_EXTENSIONS",
                DEFAULT_VIDEO_EXTENSIONS,
            ),
            allowed_audio_extensions: list_from_env(
                "ALLOWED_AUDIO_EXTENSIONS",
                DEFAULT_AUDIO_EXTENSIONS,
            ),
            video_output_formats: list_from_env(
                "SUPPORTED_VIDEO_OUTPUT_FORMATS",
                DEFAULT_VIDEO_OUTPUT_FORMATS,
            ),
            audio_output_formats: list_from_env(
                "SUPPORTED_AUDIO_OUTPUT_FORMATS",
                DEFAULT_AUDIO_OUTPUT_FORMATS,
            ),
            base_url: std::env::var("BASE_URL")
                .ok()
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    /// Classify an extension by the allow-lists alone.
    pub fn kind_for_extension(&self, ext: &str) -> Option<MediaKind> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if self.allowed_video_extensions.contains(&ext) {
            Some(MediaKind::Video)
        } else if self.allowed_audio_extensions.contains(&ext) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    /// Output formats allowed for a media kind.
    pub fn output_formats(&self, kind: MediaKind) -> &[String] {
        match kind {
            MediaKind::Video => &self.video_output_formats,
            MediaKind::Audio => &self.audio_output_formats,
        }
    }
}

fn list_from_env(key: &str, default: &str) -> Vec<String> {
    let parsed = std::env::var(key)
        .map(|s| parse_list(&s))
        .unwrap_or_default();
    if parsed.is_empty() {
        parse_list(default)
    } else {
        parsed
    }
}

/// Parse a comma-separated extension list: trimmed, lowercased, no leading dots.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" .MP4, mov ,,webm"), vec!["mp4", "mov", "webm"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = MediaConfig::default();
        assert_eq!(config.max_file_size, 524_288_000);
        assert_eq!(config.download_timeout, Duration::from_secs(30));
        assert_eq!(config.kind_for_extension("MKV"), Some(MediaKind::Video));
        assert_eq!(config.kind_for_extension(".opus"), Some(MediaKind::Audio));
        assert_eq!(config.kind_for_extension("txt"), None);
        assert!(config
            .output_formats(MediaKind::Audio)
            .iter()
            .all(|f| f != "mkv"));
    }
}
