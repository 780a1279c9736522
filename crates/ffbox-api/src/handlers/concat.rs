//! `/concat`: join 2 to 10 videos.

use axum::extract::State;
use axum::Json;
use ffbox_media::{ConcatOptions, MediaSource};
use ffbox_models::encoding::{
    is_x264_preset, CONCAT_DEFAULT_CRF, CONCAT_DEFAULT_PRESET, CONCAT_MAX_INPUTS, CONCAT_MIN_INPUTS,
};
use ffbox_models::OutputRecord;
use serde::Serialize;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::error::{ApiError, ApiResult};
use crate::handlers::form::{FormFields, Submission};
use crate::response::{success, Envelope};
use crate::state::AppState;

fn validate_preset(preset: &str) -> Result<(), ValidationError> {
    if is_x264_preset(preset) {
        Ok(())
    } else {
        Err(ValidationError::new("preset").with_message("Unknown x264 preset".into()))
    }
}

/// Normalization settings echoed back to the client.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ConcatParams {
    /// Requested spec, or `original`
    pub resolution: String,
    #[validate(range(min = 1, max = 240, message = "fps must be between 1 and 240"))]
    pub fps: Option<u32>,
    #[validate(range(max = 51, message = "crf must be between 0 and 51"))]
    pub crf: u8,
    #[validate(custom(function = "validate_preset"))]
    pub preset: String,
    pub mute: bool,
}

impl ConcatParams {
    fn from_fields(fields: &FormFields) -> ApiResult<Self> {
        let params = Self {
            resolution: fields
                .text("resolution")
                .unwrap_or("original")
                .to_string(),
            fps: fields.number("fps")?,
            crf: fields.number("crf")?.unwrap_or(CONCAT_DEFAULT_CRF),
            preset: fields
                .text("preset")
                .unwrap_or(CONCAT_DEFAULT_PRESET)
                .to_ascii_lowercase(),
            mute: fields.flag("mute", false),
        };
        params.validate()?;
        Ok(params)
    }

    fn options(&self) -> ConcatOptions {
        ConcatOptions {
            resolution: Some(self.resolution.clone()).filter(|r| r != "original"),
            fps: self.fps,
            crf: self.crf,
            preset: self.preset.clone(),
            mute: self.mute,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConcatResponse {
    pub output: OutputRecord,
    pub count: usize,
    pub options: ConcatParams,
}

pub async fn concat(
    State(state): State<AppState>,
    mut submission: Submission,
) -> ApiResult<Json<Envelope<ConcatResponse>>> {
    let params = ConcatParams::from_fields(&submission.fields)?;

    let mut inputs = submission.take_files(&["files[]", "files"]);
    let urls = submission.fields.list("urls").unwrap_or_default();

    let total = inputs.len() + urls.len();
    if total < CONCAT_MIN_INPUTS {
        return Err(ApiError::bad_request(
            "Need at least 2 videos (files[] or urls[])",
        ));
    }
    if total > CONCAT_MAX_INPUTS {
        return Err(ApiError::bad_request(format!(
            "Too many inputs (max {})",
            CONCAT_MAX_INPUTS
        )));
    }

    // Uploads first, then URLs, each in the order given
    for url in urls {
        let local = state
            .pipeline
            .acquirer()
            .acquire(MediaSource::RemoteUrl(url))
            .await?;
        inputs.push(local);
    }

    info!(count = inputs.len(), resolution = %params.resolution, "Concat request");
    let outcome = state.pipeline.concat(&inputs, &params.options()).await?;

    Ok(success(
        "Concat success",
        ConcatResponse {
            output: outcome.output,
            count: outcome.count,
            options: ConcatParams {
                resolution: outcome.resolution,
                ..params
            },
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ConcatParams::from_fields(&FormFields::default()).unwrap();
        assert_eq!(params.resolution, "original");
        assert_eq!(params.crf, 23);
        assert_eq!(params.preset, "veryfast");
        assert!(!params.mute);
        assert_eq!(params.options().resolution, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        for (key, value) in [("preset", "warp"), ("crf", "60"), ("fps", "0")] {
            let mut fields = FormFields::default();
            fields.insert(key, value);
            assert!(
                ConcatParams::from_fields(&fields).is_err(),
                "{key}={value} accepted"
            );
        }
    }

    #[test]
    fn test_resolution_passed_through() {
        let mut fields = FormFields::default();
        fields.insert("resolution", "1280:720");
        fields.insert("mute", "yes");
        let params = ConcatParams::from_fields(&fields).unwrap();
        let options = params.options();
        assert_eq!(options.resolution.as_deref(), Some("1280:720"));
        assert!(options.mute);
    }
}
