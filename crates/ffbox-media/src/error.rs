//! Error types for media operations.

use ffbox_models::MediaKind;
use ffbox_storage::StorageError;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// How an error should be reported to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller supplied something unusable
    Validation,
    /// Input exceeded the size cap
    TooLarge,
    NotFound,
    /// Remote source or external tool failed
    External,
}

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("No media_url or file provided")]
    MissingInput,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Download timed out after {0} seconds")]
    DownloadTimeout(u64),

    #[error("Failed to download media: {message}")]
    DownloadFailed { message: String },

    #[error("File too large (limit {limit} bytes)")]
    FileTooLarge { limit: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported subtitle format: {0}. Supported formats: srt, ass, ssa, vtt")]
    UnsupportedSubtitleFormat(String),

    #[error("FFprobe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid resolution format: {0}. Supported formats: '720p', '1080p', '1920x1080', '1280:720', or single dimension")]
    InvalidResolution(String),

    #[error("Resolution '{0}' needs source dimensions, which could not be determined")]
    ResolutionRequiresProbe(String),

    #[error("Unsupported format '{format}' for {kind}. Supported formats: {}", .supported.join(", "))]
    UnsupportedOutputFormat {
        format: String,
        kind: MediaKind,
        supported: Vec<String>,
    },

    #[error("Conversion failed: {message}")]
    ConversionFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Screenshot at {timestamp}s failed: {message}")]
    ScreenshotFailed { timestamp: f64, message: String },

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("File not found: {0}")]
    ArtifactNotFound(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for MediaError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => Self::ArtifactNotFound(name),
            StorageError::InvalidFilename(name) => Self::InvalidFilename(name),
            StorageError::Io(e) => Self::Io(e),
        }
    }
}

impl MediaError {
    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn probe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ProbeFailed {
            message: message.into(),
            stderr,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Re-label a tool or filesystem failure as a conversion failure.
    pub fn into_conversion_failure(self) -> Self {
        match self {
            Self::FfmpegFailed {
                message, stderr, ..
            } => Self::ConversionFailed { message, stderr },
            Self::Io(e) => Self::ConversionFailed {
                message: e.to_string(),
                stderr: None,
            },
            other => other,
        }
    }

    /// Re-label a generic FFmpeg failure as a failure of one screenshot.
    pub fn into_screenshot_failure(self, timestamp: f64) -> Self {
        match self {
            Self::FfmpegFailed { message, .. } => Self::ScreenshotFailed { timestamp, message },
            other => other,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingInput
            | Self::InvalidUrl(_)
            | Self::InvalidRequest(_)
            | Self::UnsupportedFormat(_)
            | Self::UnsupportedSubtitleFormat(_)
            | Self::InvalidResolution(_)
            | Self::ResolutionRequiresProbe(_)
            | Self::UnsupportedOutputFormat { .. }
            | Self::InvalidFilename(_) => ErrorClass::Validation,
            Self::FileTooLarge { .. } => ErrorClass::TooLarge,
            Self::ArtifactNotFound(_) => ErrorClass::NotFound,
            Self::FfmpegNotFound
            | Self::FfprobeNotFound
            | Self::DownloadTimeout(_)
            | Self::DownloadFailed { .. }
            | Self::ProbeFailed { .. }
            | Self::ConversionFailed { .. }
            | Self::ScreenshotFailed { .. }
            | Self::FfmpegFailed { .. }
            | Self::ProcessingFailed(_)
            | Self::Io(_) => ErrorClass::External,
        }
    }

    /// Captured tool output, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ProbeFailed { stderr, .. }
            | Self::ConversionFailed { stderr, .. }
            | Self::FfmpegFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            MediaError::InvalidResolution("abc".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            MediaError::FileTooLarge { limit: 10 }.class(),
            ErrorClass::TooLarge
        );
        assert_eq!(MediaError::DownloadTimeout(30).class(), ErrorClass::External);
        assert_eq!(
            MediaError::from(StorageError::not_found("x.jpg")).class(),
            ErrorClass::NotFound
        );
    }

    #[test]
    fn test_relabel_ffmpeg_failure() {
        let err = MediaError::ffmpeg_failed("exit 1", Some("boom".into()), Some(1))
            .into_screenshot_failure(12.5);
        assert!(matches!(err, MediaError::ScreenshotFailed { timestamp, .. } if timestamp == 12.5));

        let err = MediaError::ffmpeg_failed("exit 1", Some("boom".into()), Some(1))
            .into_conversion_failure();
        assert_eq!(err.stderr(), Some("boom"));
    }

    #[test]
    fn test_io_error_during_conversion_is_conversion_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "output vanished");
        let err = MediaError::from(io).into_conversion_failure();
        assert!(matches!(
            &err,
            MediaError::ConversionFailed { message, stderr: None } if message == "output vanished"
        ));
        assert_eq!(err.class(), ErrorClass::External);

        let untouched = MediaError::MissingInput.into_conversion_failure();
        assert!(matches!(untouched, MediaError::MissingInput));
    }

    #[test]
    fn test_unsupported_output_message_lists_formats() {
        let err = MediaError::UnsupportedOutputFormat {
            format: "mkv".into(),
            kind: MediaKind::Audio,
            supported: vec!["mp3".into(), "wav".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unsupported format 'mkv' for audio. Supported formats: mp3, wav"
        );
    }
}
