//! Multi-step edit requests.
//!
//! An edit is a list of inputs and an ordered list of steps. Steps that
//! produce media (concat, trim, subtitle, bgm, convert) replace the current
//! working file; screenshot and metadata steps only read it.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::encoding::is_x264_preset;
use crate::options::Quality;

fn validate_preset(preset: &str) -> Result<(), ValidationError> {
    if is_x264_preset(preset) {
        Ok(())
    } else {
        Err(ValidationError::new("preset").with_message("Unknown x264 preset".into()))
    }
}

/// One input: a bare URL or `{"url": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditInput {
    Url(String),
    Object { url: String },
}

impl EditInput {
    pub fn url(&self) -> &str {
        match self {
            EditInput::Url(url) | EditInput::Object { url } => url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConcatStep {
    /// `original` or absent keeps the first input's size
    pub resolution: Option<String>,
    #[validate(range(min = 1, max = 240, message = "fps must be between 1 and 240"))]
    pub fps: Option<u32>,
    #[validate(range(max = 51, message = "crf must be between 0 and 51"))]
    pub crf: Option<u8>,
    #[validate(custom(function = "validate_preset"))]
    pub preset: Option<String>,
    pub mute: bool,
}

/// `end` and `duration` are alternatives; neither runs to the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimStep {
    pub start: f64,
    pub end: Option<f64>,
    pub duration: Option<f64>,
}

impl TrimStep {
    /// Length of the section, or `None` for "to the end".
    pub fn section_length(&self) -> Result<Option<f64>, String> {
        if !self.start.is_finite() || self.start < 0.0 {
            return Err("trim start must be a non-negative number".to_string());
        }
        match (self.end, self.duration) {
            (Some(_), Some(_)) => Err("trim takes end or duration, not both".to_string()),
            (Some(end), None) if end.is_finite() && end > self.start => Ok(Some(end - self.start)),
            (Some(_), None) => Err("trim end must be after start".to_string()),
            (None, Some(d)) if d.is_finite() && d > 0.0 => Ok(Some(d)),
            (None, Some(_)) => Err("trim duration must be positive".to_string()),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SubtitleStep {
    #[serde(alias = "url")]
    pub subtitle_url: Option<String>,
    /// `hard` (default) or `soft`
    pub mode: Option<String>,
    pub fonts_dir: Option<String>,
    #[validate(range(max = 51, message = "crf must be between 0 and 51"))]
    pub crf: Option<u8>,
    #[validate(custom(function = "validate_preset"))]
    pub preset: Option<String>,
    #[validate(length(min = 2, max = 8, message = "Invalid subtitle language"))]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BgmStep {
    #[serde(alias = "url")]
    pub bgm_url: Option<String>,
    /// `mix` (default) or `ducking`
    pub mode: Option<String>,
    pub bgm_gain: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConvertStep {
    /// Defaults to `mp4`
    #[validate(length(min = 1, max = 10, message = "Invalid output format"))]
    pub format: Option<String>,
    pub quality: Quality,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScreenshotStep {
    #[validate(range(min = 1, max = 100, message = "Screenshot count must be between 1 and 100"))]
    pub count: Option<u32>,
    #[validate(length(max = 100, message = "At most 100 screenshot timestamps"))]
    pub timestamps: Option<Vec<f64>>,
}

/// One step of an edit, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditOperation {
    Concat(ConcatStep),
    Trim(TrimStep),
    Subtitle(SubtitleStep),
    #[serde(alias = "bgm_mix")]
    Bgm(BgmStep),
    Convert(ConvertStep),
    Screenshot(ScreenshotStep),
    Metadata,
}

impl EditOperation {
    /// Accepted values of `type`.
    pub const TYPES: &'static [&'static str] = &[
        "concat",
        "trim",
        "subtitle",
        "bgm",
        "bgm_mix",
        "convert",
        "screenshot",
        "metadata",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EditOperation::Concat(_) => "concat",
            EditOperation::Trim(_) => "trim",
            EditOperation::Subtitle(_) => "subtitle",
            EditOperation::Bgm(_) => "bgm",
            EditOperation::Convert(_) => "convert",
            EditOperation::Screenshot(_) => "screenshot",
            EditOperation::Metadata => "metadata",
        }
    }

    /// Whether the step replaces the working file.
    pub fn produces_media(&self) -> bool {
        !matches!(
            self,
            EditOperation::Screenshot(_) | EditOperation::Metadata
        )
    }

    /// Field-level checks that need no I/O.
    pub fn validate_fields(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            EditOperation::Concat(step) => step.validate(),
            EditOperation::Subtitle(step) => step.validate(),
            EditOperation::Convert(step) => step.validate(),
            EditOperation::Screenshot(step) => step.validate(),
            EditOperation::Trim(_) | EditOperation::Bgm(_) | EditOperation::Metadata => Ok(()),
        }
    }
}
