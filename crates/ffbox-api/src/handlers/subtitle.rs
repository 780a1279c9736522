//! `/subtitle`: burn in or attach a subtitle track.

use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use ffbox_media::{SubtitleMode, SubtitleSpec};
use ffbox_models::encoding::{is_x264_preset, SUBTITLE_DEFAULT_CRF, SUBTITLE_DEFAULT_PRESET};
use ffbox_models::OutputRecord;
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::handlers::form::{FormFields, Submission};
use crate::response::{success, Envelope};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubtitleResponse {
    pub output: OutputRecord,
    pub mode: &'static str,
    pub fonts_dir: Option<String>,
}

fn subtitle_spec(fields: &FormFields) -> ApiResult<SubtitleSpec> {
    let crf = fields.number::<u8>("crf")?.unwrap_or(SUBTITLE_DEFAULT_CRF);
    if crf > 51 {
        return Err(ApiError::bad_request("crf must be between 0 and 51"));
    }
    let preset = fields
        .text("preset")
        .unwrap_or(SUBTITLE_DEFAULT_PRESET)
        .to_ascii_lowercase();
    if !is_x264_preset(&preset) {
        return Err(ApiError::bad_request(format!("Unknown x264 preset: {}", preset)));
    }

    Ok(SubtitleSpec {
        mode: fields
            .text("mode")
            .map(SubtitleMode::parse)
            .unwrap_or_default(),
        fonts_dir: fields.text("fonts_dir").map(PathBuf::from),
        crf,
        preset,
        language: fields.text("language").map(str::to_string),
    })
}

pub async fn subtitle(
    State(state): State<AppState>,
    mut submission: Submission,
) -> ApiResult<Json<Envelope<SubtitleResponse>>> {
    let spec = subtitle_spec(&submission.fields)?;

    let acquirer = state.pipeline.acquirer();
    let video = submission
        .take_input(acquirer, "media_url", "file")
        .await?
        .ok_or_else(|| ApiError::bad_request("Need media_url or file (video)"))?;
    let subtitles = submission
        .take_subtitles(acquirer, "subtitle_url", "subtitle")
        .await?
        .ok_or_else(|| ApiError::bad_request("Need subtitle_url or subtitle file"))?;

    info!(mode = spec.mode.as_str(), format = subtitles.format(), "Subtitle request");
    let output = state
        .pipeline
        .apply_subtitles(&video, &subtitles, &spec)
        .await?;

    Ok(success(
        "Subtitle applied",
        SubtitleResponse {
            output,
            mode: spec.mode.as_str(),
            fonts_dir: spec.fonts_dir.map(|d| d.display().to_string()),
        },
    ))
}
