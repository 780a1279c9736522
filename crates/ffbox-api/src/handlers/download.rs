//! `/download/:filename`: stream a registered artifact.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use ffbox_media::MediaError;
use ffbox_storage::{is_valid_artifact_name, ArtifactRegistry};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub auto_delete: Option<String>,
}

impl DownloadQuery {
    fn auto_delete(&self) -> bool {
        self.auto_delete
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "opus" => "audio/opus",
        _ => "application/octet-stream",
    }
}

/// Delete through the registry from a drop handler.
fn delete_in_background(registry: Arc<ArtifactRegistry>, filename: String) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(filename = %filename, "No runtime for auto-delete; left for the cleanup sweep");
        return;
    };
    handle.spawn(async move {
        match registry.delete(&filename).await {
            Ok(true) => info!(filename = %filename, "Auto-deleted file after download"),
            Ok(false) => {}
            Err(e) => warn!(filename = %filename, error = %e, "Failed to auto-delete"),
        }
    });
}

pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    if !is_valid_artifact_name(&filename) {
        return Err(ApiError::bad_request("Invalid filename"));
    }

    let not_found = || ApiError::not_found("File not found");
    let (artifact, path) = state
        .pipeline
        .fetch_artifact(&filename)
        .await
        .map_err(|e| match e {
            MediaError::ArtifactNotFound(_) => not_found(),
            other => ApiError::Media(other),
        })?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Swept between lookup and open
            return Err(not_found());
        }
        Err(e) => return Err(ApiError::Media(MediaError::Io(e))),
    };
    let length = file
        .metadata()
        .await
        .map(|m| m.len())
        .unwrap_or(artifact.size_bytes);

    let auto_delete = query.auto_delete();
    metrics::record_download(auto_delete);
    info!(filename = %filename, size = length, auto_delete, "Serving file");

    let stream = ReaderStream::new(file);
    let body = if auto_delete {
        // Fires once the body is finished or dropped mid-transfer
        let guard = scopeguard::guard(
            (Arc::clone(&state.registry), filename.clone()),
            |(registry, filename)| delete_in_background(registry, filename),
        );
        Body::from_stream(stream.map(move |chunk| {
            let _held = &guard;
            chunk
        }))
    } else {
        Body::from_stream(stream)
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&filename))
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
