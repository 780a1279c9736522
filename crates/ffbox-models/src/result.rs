//! Processing results returned to callers.

use serde::{Deserialize, Serialize};

use crate::{MediaInfo, MediaKind};

/// Build the public download URL for an artifact.
///
/// Relative (`/download/<name>`) unless a base URL is configured.
pub fn download_url(base_url: Option<&str>, filename: &str) -> String {
    match base_url.map(|b| b.trim_end_matches('/')).filter(|b| !b.is_empty()) {
        Some(base) => format!("{}/download/{}", base, filename),
        None => format!("/download/{}", filename),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub timestamp: f64,
    pub filename: String,
    pub file_size: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotFailure {
    pub timestamp: f64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub filename: String,
    pub file_size: u64,
    pub format: String,
    /// Requested resolution spec, or `original`
    pub resolution: String,
    pub url: String,
}

/// Single-output operations (mix, concat).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub filename: String,
    pub file_size: u64,
    pub url: String,
}

/// A requested operation that did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFailure {
    /// `info`, `screenshots` or `conversion`
    pub operation: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub media_type: MediaKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<MediaInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<Vec<ScreenshotRecord>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshot_failures: Vec<ScreenshotFailure>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ConversionRecord>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<OperationFailure>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ProcessingResult {
    pub fn new(media_type: MediaKind) -> Self {
        Self {
            media_type,
            info: None,
            screenshots: None,
            screenshot_failures: Vec::new(),
            conversion: None,
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Every artifact filename referenced by this result.
    pub fn artifact_filenames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .screenshots
            .iter()
            .flatten()
            .map(|s| s.filename.as_str())
            .collect();
        if let Some(conversion) = &self.conversion {
            names.push(conversion.filename.as_str());
        }
        names
    }
}

/// Outcome of a multi-step edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditResult {
    /// The working file after the last producing step
    pub output: OutputRecord,
    /// Step names in the order they ran
    pub steps: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<ScreenshotRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaInfo>,

    /// Set when a convert step ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ConversionRecord>,
}

impl EditResult {
    /// Every artifact filename referenced by this result.
    pub fn artifact_filenames(&self) -> Vec<&str> {
        let mut names = vec![self.output.filename.as_str()];
        names.extend(self.screenshots.iter().map(|s| s.filename.as_str()));
        if let Some(conversion) = &self.conversion {
            names.push(conversion.filename.as_str());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url() {
        assert_eq!(download_url(None, "a.jpg"), "/download/a.jpg");
        assert_eq!(download_url(Some(""), "a.jpg"), "/download/a.jpg");
        assert_eq!(
            download_url(Some("https://media.example.com/"), "a.jpg"),
            "https://media.example.com/download/a.jpg"
        );
    }

    #[test]
    fn test_edit_result_lists_every_artifact() {
        let output = OutputRecord {
            filename: "sub_hard_1.mp4".into(),
            file_size: 10,
            url: "/download/sub_hard_1.mp4".into(),
        };
        let result = EditResult {
            output,
            steps: vec!["subtitle".into(), "screenshot".into()],
            screenshots: vec![ScreenshotRecord {
                timestamp: 1.0,
                filename: "screenshot_2_1.jpg".into(),
                file_size: 4,
                url: "/download/screenshot_2_1.jpg".into(),
            }],
            metadata: None,
            conversion: None,
        };
        assert_eq!(
            result.artifact_filenames(),
            vec!["sub_hard_1.mp4", "screenshot_2_1.jpg"]
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(json["steps"][1], "screenshot");
    }

    #[test]
    fn test_empty_collections_are_omitted() {
        let result = ProcessingResult::new(MediaKind::Audio);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["media_type"], "audio");
        assert!(json.get("failures").is_none());
        assert!(json.get("info").is_none());
    }
}
