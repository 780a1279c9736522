//! Registered output artifacts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What produced an artifact, with kind-specific metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot {
        timestamp: f64,
    },
    Conversion {
        format: String,
        resolution_label: String,
    },
    /// Video with background music mixed in
    Mix,
    Concat,
    /// Video with a subtitle track burned in or muxed
    Subtitled {
        mode: String,
    },
    /// Section cut out of an input
    Trim,
    /// Found on disk at startup, origin unknown
    Adopted,
}

impl ArtifactKind {
    /// Short label used in metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Screenshot { .. } => "screenshot",
            ArtifactKind::Conversion { .. } => "conversion",
            ArtifactKind::Mix => "mix",
            ArtifactKind::Concat => "concat",
            ArtifactKind::Subtitled { .. } => "subtitled",
            ArtifactKind::Trim => "trim",
            ArtifactKind::Adopted => "adopted",
        }
    }
}

/// A derived file in temp storage, tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Generated file name, unique within the storage root
    pub filename: String,
    #[serde(flatten)]
    pub kind: ArtifactKind,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(filename: impl Into<String>, kind: ArtifactKind, size_bytes: u64) -> Self {
        Self {
            filename: filename.into(),
            kind,
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Override the creation time.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// True when the artifact is strictly older than `retention` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        now.signed_duration_since(self.created_at) > retention
    }
}
