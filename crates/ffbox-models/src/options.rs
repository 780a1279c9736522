//! Typed processing options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Conversion quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// Constant Rate Factor used for video conversions.
    pub fn crf(&self) -> u8 {
        match self {
            Quality::Low => 28,
            Quality::Medium => 23,
            Quality::High => 18,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid quality '{0}', expected low, medium or high")]
pub struct ParseQualityError(pub String);

impl FromStr for Quality {
    type Err = ParseQualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(ParseQualityError(s.to_string())),
        }
    }
}

/// What to do with an acquired media file.
///
/// When both `screenshot_timestamps` and `screenshot_count` are present the
/// explicit timestamps win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProcessingOptions {
    #[serde(default = "default_true")]
    pub extract_info: bool,

    #[serde(default)]
    pub take_screenshots: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100, message = "At most 100 screenshot timestamps"))]
    pub screenshot_timestamps: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 100, message = "Screenshot count must be between 1 and 100"))]
    pub screenshot_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 10, message = "Invalid output format"))]
    pub convert_format: Option<String>,

    #[serde(default)]
    pub convert_quality: Quality,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 32, message = "Invalid resolution"))]
    pub convert_resolution: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            extract_info: true,
            take_screenshots: false,
            screenshot_timestamps: None,
            screenshot_count: None,
            convert_format: None,
            convert_quality: Quality::Medium,
            convert_resolution: None,
        }
    }
}

impl ProcessingOptions {
    /// Trim and lowercase free-form fields, turning blanks into `None`.
    pub fn normalized(mut self) -> Self {
        self.convert_format = self
            .convert_format
            .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|f| !f.is_empty());
        self.convert_resolution = self
            .convert_resolution
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if matches!(self.screenshot_timestamps.as_deref(), Some([])) {
            self.screenshot_timestamps = None;
        }
        self
    }
}
