//! Media kinds and normalized probe metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad classification of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for a video file (first video stream plus container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Size in bytes as reported by the container
    pub size: u64,
    pub format_name: String,
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second, parsed from `r_frame_rate`
    pub frame_rate: f64,
    pub bit_rate: u64,
}

/// Metadata for an audio file (first audio stream plus container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub duration: f64,
    pub size: u64,
    pub format_name: String,
    pub codec_name: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_rate: u64,
    pub channel_layout: String,
}

/// Probe result, one variant per media kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaInfo {
    Video(VideoInfo),
    Audio(AudioInfo),
}

impl MediaInfo {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaInfo::Video(_) => MediaKind::Video,
            MediaInfo::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            MediaInfo::Video(v) => v.duration,
            MediaInfo::Audio(a) => a.duration,
        }
    }

    /// Source dimensions, when known and non-zero.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            MediaInfo::Video(v) if v.width > 0 && v.height > 0 => Some((v.width, v.height)),
            _ => None,
        }
    }
}
