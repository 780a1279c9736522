//! `/process` and `/info`.

use axum::extract::State;
use axum::Json;
use ffbox_media::MediaError;
use ffbox_models::{ProcessingOptions, ProcessingResult, Quality};
use tracing::info;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::form::{FormFields, Submission};
use crate::response::{success, Envelope};
use crate::state::AppState;

/// Build typed options from request fields.
pub fn options_from_fields(fields: &FormFields) -> ApiResult<ProcessingOptions> {
    let convert_quality = match fields.text("convert_quality") {
        Some(raw) => raw
            .parse::<Quality>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => Quality::default(),
    };

    let options = ProcessingOptions {
        extract_info: fields.flag("extract_info", true),
        take_screenshots: fields.flag("take_screenshots", false),
        screenshot_timestamps: fields.float_list("screenshot_timestamps")?,
        screenshot_count: fields.number("screenshot_count")?,
        convert_format: fields.text("convert_format").map(str::to_string),
        convert_quality,
        convert_resolution: fields.text("convert_resolution").map(str::to_string),
    };
    options.validate()?;
    Ok(options.normalized())
}

/// Run info, screenshot and conversion operations on one input.
pub async fn process(
    State(state): State<AppState>,
    mut submission: Submission,
) -> ApiResult<Json<Envelope<ProcessingResult>>> {
    let options = options_from_fields(&submission.fields)?;
    info!(
        extract_info = options.extract_info,
        take_screenshots = options.take_screenshots,
        convert_format = ?options.convert_format,
        quality = %options.convert_quality,
        "Processing request"
    );

    let input = submission
        .take_input(state.pipeline.acquirer(), "media_url", "file")
        .await?
        .ok_or(ApiError::Media(MediaError::MissingInput))?;

    let result = state.pipeline.process_acquired(&input, &options).await?;
    Ok(success("Media processing completed successfully", result))
}

/// Probe one input.
pub async fn info(
    State(state): State<AppState>,
    mut submission: Submission,
) -> ApiResult<Json<Envelope<ProcessingResult>>> {
    let input = submission
        .take_input(state.pipeline.acquirer(), "media_url", "file")
        .await?
        .ok_or(ApiError::Media(MediaError::MissingInput))?;

    let result = state.pipeline.inspect_acquired(&input).await?;
    Ok(success("Media information extracted successfully", result))
}
