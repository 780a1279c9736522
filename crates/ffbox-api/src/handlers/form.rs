//! Request bodies as loosely typed fields.
//!
//! Every processing endpoint accepts JSON, urlencoded forms or multipart uploads.
//! All three are reduced to the same [`Submission`]: text fields keyed by name,
//! and uploaded files already streamed into the storage root.

use std::collections::HashMap;
use std::io;
use std::str::FromStr;

use axum::async_trait;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use ffbox_media::{
    BodyLimitExceeded, InputAcquirer, LocalMediaFile, LocalSubtitleFile, MediaSource, UploadSource,
};
use ffbox_models::encoding::CONCAT_MAX_INPUTS;
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Form-style truthiness: `true`, `1`, `yes` or `on`.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// A JSON array, or a comma separated list.
fn split_list(raw: &str) -> Vec<String> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Text fields of a request.
#[derive(Debug, Default, Clone)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.text(key).map(parse_bool).unwrap_or(default)
    }

    /// Parsed value; a present but unparsable value is a client error.
    pub fn number<T: FromStr>(&self, key: &str) -> ApiResult<Option<T>> {
        self.text(key)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| ApiError::bad_request(format!("Invalid value for {}: {}", key, v)))
            })
            .transpose()
    }

    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.text(key).map(split_list).filter(|l| !l.is_empty())
    }

    pub fn float_list(&self, key: &str) -> ApiResult<Option<Vec<f64>>> {
        self.list(key)
            .map(|items| {
                items
                    .iter()
                    .map(|s| {
                        s.parse::<f64>().map_err(|_| {
                            ApiError::bad_request(format!("Invalid value in {}: {}", key, s))
                        })
                    })
                    .collect()
            })
            .transpose()
    }

    /// Flatten a JSON object: strings as-is, scalars and arrays as JSON text.
    fn from_json(value: Value) -> ApiResult<Self> {
        let Value::Object(map) = value else {
            return Err(ApiError::bad_request("Request body must be a JSON object"));
        };
        let mut fields = Self::default();
        for (key, value) in map {
            match value {
                Value::Null => {}
                Value::String(s) => fields.insert(key, s),
                other => fields.insert(key, other.to_string()),
            }
        }
        Ok(fields)
    }
}

/// Upload fields holding subtitle tracks rather than media.
const SUBTITLE_FIELDS: &[&str] = &["subtitle"];

/// A parsed request: text fields plus uploaded files in arrival order.
#[derive(Debug, Default)]
pub struct Submission {
    pub fields: FormFields,
    files: Vec<(String, LocalMediaFile)>,
    subtitles: Vec<(String, LocalSubtitleFile)>,
}

impl Submission {
    /// Remove and return the first upload in field `name`.
    pub fn take_file(&mut self, name: &str) -> Option<LocalMediaFile> {
        let index = self.files.iter().position(|(field, _)| field == name)?;
        Some(self.files.remove(index).1)
    }

    /// Remove and return every upload whose field is one of `names`, in order.
    pub fn take_files(&mut self, names: &[&str]) -> Vec<LocalMediaFile> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(field, _)| names.contains(&field.as_str()));
        self.files = kept;
        taken.into_iter().map(|(_, file)| file).collect()
    }

    /// Resolve one input: the URL field wins over an upload.
    pub async fn take_input(
        &mut self,
        acquirer: &InputAcquirer,
        url_field: &str,
        file_field: &str,
    ) -> ApiResult<Option<LocalMediaFile>> {
        if let Some(url) = self.fields.text(url_field).map(str::to_string) {
            return Ok(Some(acquirer.acquire(MediaSource::RemoteUrl(url)).await?));
        }
        Ok(self.take_file(file_field))
    }

    /// Resolve a subtitle track: the URL field wins over an upload.
    pub async fn take_subtitles(
        &mut self,
        acquirer: &InputAcquirer,
        url_field: &str,
        file_field: &str,
    ) -> ApiResult<Option<LocalSubtitleFile>> {
        if let Some(url) = self.fields.text(url_field).map(str::to_string) {
            return Ok(Some(
                acquirer
                    .acquire_subtitles(MediaSource::RemoteUrl(url))
                    .await?,
            ));
        }
        let index = self.subtitles.iter().position(|(field, _)| field == file_field);
        Ok(index.map(|i| self.subtitles.remove(i).1))
    }

    async fn from_multipart(mut multipart: Multipart, acquirer: &InputAcquirer) -> ApiResult<Self> {
        let mut submission = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(filename) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                submission.fields.insert(name, value);
                continue;
            };
            // Browsers send an empty part for an unselected file input
            if filename.is_empty() {
                continue;
            }
            if submission.files.len() + submission.subtitles.len() >= CONCAT_MAX_INPUTS {
                return Err(ApiError::bad_request(format!(
                    "Too many files (max {})",
                    CONCAT_MAX_INPUTS
                )));
            }

            debug!(field = %name, filename = %filename, "Receiving upload field");
            let upload = UploadSource {
                filename: Some(filename),
                declared_size: None,
                stream: field
                    .map_err(|e| {
                        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                            io::Error::other(BodyLimitExceeded)
                        } else {
                            io::Error::other(e)
                        }
                    })
                    .boxed(),
            };
            let source = MediaSource::Upload(upload);
            if SUBTITLE_FIELDS.contains(&name.as_str()) {
                let subtitles = acquirer.acquire_subtitles(source).await?;
                submission.subtitles.push((name, subtitles));
            } else {
                let local = acquirer.acquire(source).await?;
                submission.files.push((name, local));
            }
        }

        Ok(submission)
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[async_trait]
impl FromRequest<AppState> for Submission {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let content_type = content_type(req.headers());

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            return Self::from_multipart(multipart, state.pipeline.acquirer()).await;
        }

        let fields = if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(map) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            FormFields(map)
        } else if content_type.starts_with("application/json") {
            let Json(value) = Json::<Value>::from_request(req, state).await?;
            FormFields::from_json(value)?
        } else {
            FormFields::default()
        };

        Ok(Self {
            fields,
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bool() {
        for yes in ["true", "TRUE", "1", "yes", " on "] {
            assert!(parse_bool(yes), "{yes}");
        }
        for no in ["false", "0", "no", "", "maybe"] {
            assert!(!parse_bool(no), "{no}");
        }
    }

    #[test]
    fn test_lists_accept_json_or_commas() {
        assert_eq!(split_list("[1, 2.5, \"3\"]"), vec!["1", "2.5", "3"]);
        assert_eq!(split_list(" 1, 2.5 ,,3"), vec!["1", "2.5", "3"]);
        assert_eq!(
            split_list("[\"http://a/x.mp4\", \"http://b/y.mp4\"]"),
            vec!["http://a/x.mp4", "http://b/y.mp4"]
        );
    }

    #[test]
    fn test_json_object_flattened() {
        let fields = FormFields::from_json(json!({
            "media_url": "http://x/a.mp4",
            "take_screenshots": true,
            "screenshot_count": 4,
            "screenshot_timestamps": [1.5, 3],
            "convert_format": null
        }))
        .unwrap();

        assert_eq!(fields.text("media_url"), Some("http://x/a.mp4"));
        assert!(fields.flag("take_screenshots", false));
        assert_eq!(fields.number::<u32>("screenshot_count").unwrap(), Some(4));
        assert_eq!(
            fields.float_list("screenshot_timestamps").unwrap(),
            Some(vec![1.5, 3.0])
        );
        assert_eq!(fields.text("convert_format"), None);
    }

    #[test]
    fn test_non_object_json_rejected() {
        assert!(FormFields::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_invalid_number_is_client_error() {
        let mut fields = FormFields::default();
        fields.insert("fps", "fast");
        fields.insert("screenshot_timestamps", "1,abc");
        assert!(fields.number::<u32>("fps").is_err());
        assert!(fields.float_list("screenshot_timestamps").is_err());
        assert_eq!(fields.number::<u32>("missing").unwrap(), None);
    }
}
