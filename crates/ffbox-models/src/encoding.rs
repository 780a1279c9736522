//! Encoding presets and per-format quality tables.

use crate::Quality;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Codecs used when the container is WebM
pub const WEBM_VIDEO_CODEC: &str = "libvpx-vp9";
pub const WEBM_AUDIO_CODEC: &str = "libopus";
/// Fallback audio bitrate for formats without a quality table
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// JPEG quality scale for screenshots (2 is near-lossless)
pub const SCREENSHOT_JPEG_QUALITY: u8 = 2;
/// Positions used when neither timestamps nor a count are requested
pub const DEFAULT_SCREENSHOT_FRACTIONS: [f64; 3] = [0.25, 0.5, 0.75];

/// Background-music defaults
pub const DEFAULT_BGM_GAIN: f64 = 0.25;
pub const BGM_AUDIO_BITRATE: &str = "192k";

/// Concatenation defaults
pub const CONCAT_DEFAULT_CRF: u8 = 23;
pub const CONCAT_DEFAULT_PRESET: &str = "veryfast";
pub const CONCAT_MIN_INPUTS: usize = 2;
pub const CONCAT_MAX_INPUTS: usize = 10;

/// Subtitle defaults, for burn-in re-encodes
pub const SUBTITLE_DEFAULT_CRF: u8 = 23;
pub const SUBTITLE_DEFAULT_PRESET: &str = "veryfast";

/// Most steps accepted in one edit request
pub const EDIT_MAX_OPERATIONS: usize = 20;

/// Presets understood by libx264.
pub const X264_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

pub fn is_x264_preset(preset: &str) -> bool {
    X264_PRESETS.contains(&preset)
}

/// Video/audio codec pair for a target container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecPair {
    pub video: &'static str,
    pub audio: &'static str,
}

impl CodecPair {
    /// Pick codecs compatible with the given container extension.
    pub fn for_container(format: &str) -> Self {
        if format.eq_ignore_ascii_case("webm") {
            Self {
                video: WEBM_VIDEO_CODEC,
                audio: WEBM_AUDIO_CODEC,
            }
        } else {
            Self {
                video: DEFAULT_VIDEO_CODEC,
                audio: DEFAULT_AUDIO_CODEC,
            }
        }
    }
}

/// Audio encoder for an audio-only output format, if ffmpeg should not guess.
pub fn audio_codec_for(format: &str) -> Option<&'static str> {
    match format {
        "mp3" => Some("libmp3lame"),
        "aac" | "m4a" => Some("aac"),
        "ogg" => Some("libvorbis"),
        "opus" => Some("libopus"),
        "flac" => Some("flac"),
        "wav" => Some("pcm_s16le"),
        _ => None,
    }
}

/// Rate-control argument for an audio conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioQualityArg {
    /// Constant bitrate, e.g. `-b:a 192k`
    Bitrate(&'static str),
    /// Encoder VBR scale, e.g. `-q:a 6`
    VbrQuality(u8),
    /// Lossless container, no rate control
    Lossless,
}

impl AudioQualityArg {
    pub fn for_format(format: &str, quality: Quality) -> Self {
        use AudioQualityArg::*;
        match (format, quality) {
            ("mp3", Quality::Low) => Bitrate("128k"),
            ("mp3", Quality::Medium) => Bitrate("192k"),
            ("mp3", Quality::High) => Bitrate("320k"),
            ("aac", Quality::Low) => Bitrate("128k"),
            ("aac", Quality::Medium) => Bitrate("192k"),
            ("aac", Quality::High) => Bitrate("256k"),
            ("ogg", Quality::Low) => VbrQuality(3),
            ("ogg", Quality::Medium) => VbrQuality(6),
            ("ogg", Quality::High) => VbrQuality(9),
            ("opus", Quality::Low) => Bitrate("96k"),
            ("opus", Quality::Medium) => Bitrate("128k"),
            ("opus", Quality::High) => Bitrate("192k"),
            ("wav" | "flac", _) => Lossless,
            _ => Bitrate(DEFAULT_AUDIO_BITRATE),
        }
    }

    pub fn to_ffmpeg_args(self) -> Vec<String> {
        match self {
            AudioQualityArg::Bitrate(rate) => vec!["-b:a".to_string(), rate.to_string()],
            AudioQualityArg::VbrQuality(q) => vec!["-q:a".to_string(), q.to_string()],
            AudioQualityArg::Lossless => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_pair_for_webm() {
        let pair = CodecPair::for_container("WEBM");
        assert_eq!(pair.video, "libvpx-vp9");
        assert_eq!(pair.audio, "libopus");
        assert_eq!(CodecPair::for_container("mkv").video, "libx264");
    }

    #[test]
    fn test_audio_quality_table() {
        assert_eq!(
            AudioQualityArg::for_format("mp3", Quality::High).to_ffmpeg_args(),
            vec!["-b:a", "320k"]
        );
        assert_eq!(
            AudioQualityArg::for_format("ogg", Quality::Low).to_ffmpeg_args(),
            vec!["-q:a", "3"]
        );
        assert!(AudioQualityArg::for_format("flac", Quality::High)
            .to_ffmpeg_args()
            .is_empty());
        assert_eq!(
            AudioQualityArg::for_format("m4a", Quality::Low),
            AudioQualityArg::Bitrate("192k")
        );
    }
}
