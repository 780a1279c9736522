//! `/bgm`: mix a background track into a video.

use axum::extract::State;
use axum::Json;
use ffbox_media::{MixMode, MixSpec};
use ffbox_models::encoding::DEFAULT_BGM_GAIN;
use ffbox_models::OutputRecord;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::handlers::form::Submission;
use crate::response::{success, Envelope};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BgmResponse {
    pub output: OutputRecord,
    pub mode: &'static str,
    pub bgm_gain: f64,
}

pub async fn bgm(
    State(state): State<AppState>,
    mut submission: Submission,
) -> ApiResult<Json<Envelope<BgmResponse>>> {
    let spec = MixSpec {
        mode: submission
            .fields
            .text("mode")
            .map(MixMode::parse)
            .unwrap_or_default(),
        bgm_gain: submission
            .fields
            .number::<f64>("bgm_gain")?
            .unwrap_or(DEFAULT_BGM_GAIN),
    };

    let acquirer = state.pipeline.acquirer();
    let video = submission
        .take_input(acquirer, "media_url", "file")
        .await?
        .ok_or_else(|| ApiError::bad_request("Need media_url or file (video)"))?;
    let music = submission
        .take_input(acquirer, "bgm_url", "bgm")
        .await?
        .ok_or_else(|| ApiError::bad_request("Need bgm_url or bgm file"))?;

    let output = state.pipeline.mix_background(&video, &music, &spec).await?;

    Ok(success(
        "BGM mixed",
        BgmResponse {
            output,
            mode: spec.mode.as_str(),
            bgm_gain: spec.bgm_gain,
        },
    ))
}
