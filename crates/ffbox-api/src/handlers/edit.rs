//! `/edit`: run several steps against one working file.
//!
//! `inputs` and `operations` arrive as JSON, either inline in a JSON body or
//! as text fields of a form. Uploaded `files[]` come before URL inputs.

use axum::extract::State;
use axum::Json;
use ffbox_media::{validate_edit_plan, MediaSource};
use ffbox_models::{EditInput, EditOperation, EditResult};
use serde_json::Value;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::handlers::form::{FormFields, Submission};
use crate::response::{success, Envelope};
use crate::state::AppState;

fn parse_inputs(fields: &FormFields) -> ApiResult<Vec<String>> {
    let Some(raw) = fields.text("inputs") else {
        return Ok(Vec::new());
    };
    let inputs: Vec<EditInput> = serde_json::from_str(raw)
        .map_err(|_| ApiError::bad_request("inputs must be a JSON array of URLs"))?;
    Ok(inputs.iter().map(|i| i.url().trim().to_string()).collect())
}

fn parse_operation(value: Value) -> ApiResult<EditOperation> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("Each operation needs a type"))?;
    if !EditOperation::TYPES.contains(&kind.as_str()) {
        return Err(ApiError::bad_request(format!("Unknown operation: {}", kind)));
    }
    serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(format!("Invalid {} operation: {}", kind, e)))
}

fn parse_operations(fields: &FormFields) -> ApiResult<Vec<EditOperation>> {
    let raw = fields
        .text("operations")
        .ok_or_else(|| ApiError::bad_request("operations is required"))?;
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) else {
        return Err(ApiError::bad_request("operations must be a JSON array"));
    };
    items.into_iter().map(parse_operation).collect()
}

pub async fn edit(
    State(state): State<AppState>,
    mut submission: Submission,
) -> ApiResult<Json<Envelope<EditResult>>> {
    let operations = parse_operations(&submission.fields)?;
    let urls = parse_inputs(&submission.fields)?;
    let mut inputs = submission.take_files(&["files[]", "files"]);

    // Nothing is downloaded for a plan that cannot run
    validate_edit_plan(inputs.len() + urls.len(), &operations)?;

    for url in urls {
        let local = state
            .pipeline
            .acquirer()
            .acquire(MediaSource::RemoteUrl(url))
            .await?;
        inputs.push(local);
    }

    info!(inputs = inputs.len(), steps = operations.len(), "Edit request");
    let result = state.pipeline.edit(&inputs, &operations).await?;
    Ok(success("Edit pipeline success", result))
}
