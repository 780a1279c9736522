//! Media acquisition, probing and artifact generation.
//!
//! This crate provides:
//! - Size-capped input acquisition from URLs and uploads
//! - Type-safe FFmpeg command building with kill timeouts
//! - FFprobe output normalization
//! - Resolution parsing
//! - Screenshot, conversion, music-mix, concat, subtitle and trim generation
//! - Multi-step edits over a working file
//! - The request pipeline tying these together

pub mod acquire;
pub mod command;
pub mod config;
pub mod edit;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod probe;
pub mod resolution;
pub mod sniff;
pub mod toolkit;

pub use acquire::{
    BodyLimitExceeded, InputAcquirer, LocalMediaFile, LocalSubtitleFile, MediaSource, UploadSource,
    SUBTITLE_FORMATS,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use config::MediaConfig;
pub use edit::{validate_edit_plan, EDITS_COUNTER};
pub use error::{ErrorClass, MediaError, MediaResult};
pub use generator::{plan_screenshot_timestamps, ArtifactGenerator, ScreenshotOutcome};
pub use pipeline::{ConcatOptions, ConcatOutcome, MediaPipeline, ProcessingRequest};
pub use probe::{parse_probe_output, probe_media};
pub use resolution::{resolve_resolution, Dimensions, ResolvedResolution};
pub use sniff::sniff_media_kind;
pub use toolkit::{
    ConcatSpec, FfmpegToolkit, MediaToolkit, MixMode, MixSpec, SubtitleMode, SubtitleSpec,
    TranscodeSpec, TrimSpec,
};
