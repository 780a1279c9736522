//! Shared data models for the ffbox media service.
//!
//! This crate provides Serde-serializable types for:
//! - Media kinds and probed metadata
//! - Processing options and results
//! - Registered artifacts
//! - Multi-step edit requests
//! - Encoding presets and per-format quality tables

pub mod artifact;
pub mod edit;
pub mod encoding;
pub mod media;
pub mod options;
pub mod result;

// Re-export common types
pub use artifact::{Artifact, ArtifactKind};
pub use edit::{
    BgmStep, ConcatStep, ConvertStep, EditInput, EditOperation, ScreenshotStep, SubtitleStep,
    TrimStep,
};
pub use encoding::{AudioQualityArg, CodecPair};
pub use media::{AudioInfo, MediaInfo, MediaKind, VideoInfo};
pub use options::{ParseQualityError, ProcessingOptions, Quality};
pub use result::{
    download_url, ConversionRecord, EditResult, OperationFailure, OutputRecord, ProcessingResult, ScreenshotFailure,
    ScreenshotRecord,
};
