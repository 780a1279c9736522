//! Artifact generation.
//!
//! Every output is written under the storage root, and registered only once the
//! tool has exited successfully. Outputs of failed runs are removed.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ffbox_models::encoding::DEFAULT_SCREENSHOT_FRACTIONS;
use ffbox_models::{
    download_url, Artifact, ArtifactKind, ConversionRecord, MediaKind, OutputRecord, Quality,
    ScreenshotFailure, ScreenshotRecord,
};
use ffbox_storage::{ArtifactRegistry, StorageRoot};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::resolution::ResolvedResolution;
use crate::toolkit::{
    ConcatSpec, MediaToolkit, MixSpec, SubtitleMode, SubtitleSpec, TranscodeSpec, TrimSpec,
};

/// Counter of registered artifacts, labelled by kind.
pub const ARTIFACTS_CREATED_COUNTER: &str = "ffbox_artifacts_created_total";
/// Counter of failed generation attempts, labelled by kind.
pub const ARTIFACT_FAILURES_COUNTER: &str = "ffbox_artifact_failures_total";

/// Timestamps at which to capture screenshots.
///
/// Explicit timestamps win and are filtered to finite values in
/// `[0, duration)`. Otherwise `count` evenly spaced midpoints, otherwise 25%,
/// 50% and 75% of the duration. Unknown or zero duration yields nothing.
pub fn plan_screenshot_timestamps(
    duration: f64,
    explicit: Option<&[f64]>,
    count: Option<u32>,
) -> Vec<f64> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    if let Some(timestamps) = explicit.filter(|t| !t.is_empty()) {
        return timestamps
            .iter()
            .copied()
            .filter(|t| t.is_finite() && *t >= 0.0 && *t < duration)
            .collect();
    }
    match count.filter(|n| *n > 0) {
        Some(n) => (0..n)
            .map(|i| duration * (f64::from(i) + 0.5) / f64::from(n))
            .collect(),
        None => DEFAULT_SCREENSHOT_FRACTIONS
            .iter()
            .map(|f| duration * f)
            .collect(),
    }
}

/// Screenshots taken plus per-timestamp failures.
#[derive(Debug, Default)]
pub struct ScreenshotOutcome {
    pub records: Vec<ScreenshotRecord>,
    pub failures: Vec<ScreenshotFailure>,
    /// First failure, kept for reporting when nothing succeeded
    pub first_error: Option<MediaError>,
}

#[derive(Clone)]
pub struct ArtifactGenerator {
    toolkit: Arc<dyn MediaToolkit>,
    registry: Arc<ArtifactRegistry>,
    config: MediaConfig,
}

impl ArtifactGenerator {
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        registry: Arc<ArtifactRegistry>,
        config: MediaConfig,
    ) -> Self {
        Self {
            toolkit,
            registry,
            config,
        }
    }

    fn root(&self) -> &StorageRoot {
        self.registry.root()
    }

    fn url_for(&self, filename: &str) -> String {
        download_url(self.config.base_url.as_deref(), filename)
    }

    /// Reject output formats outside the allow-list for `kind`.
    pub fn check_output_format(&self, kind: MediaKind, format: &str) -> MediaResult<()> {
        let supported = self.config.output_formats(kind);
        if supported.iter().any(|f| f == format) {
            Ok(())
        } else {
            Err(MediaError::UnsupportedOutputFormat {
                format: format.to_string(),
                kind,
                supported: supported.to_vec(),
            })
        }
    }

    /// Run `make` against a fresh output path, then register the result.
    async fn produce<F, Fut>(
        &self,
        filename: String,
        kind: ArtifactKind,
        make: F,
    ) -> MediaResult<Artifact>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = MediaResult<()>>,
    {
        let label = kind.label();
        let path = self.root().resolve(&filename)?;
        // Removes partial output on every early return
        let guard = TempPath::from_path(&path);

        let outcome = async {
            make(path.clone()).await?;
            let size = tokio::fs::metadata(&path).await?.len();
            if size == 0 {
                return Err(MediaError::ffmpeg_failed("FFmpeg produced an empty file", None, None));
            }
            Ok(size)
        }
        .await;

        let size = match outcome {
            Ok(size) => size,
            Err(e) => {
                metrics::counter!(ARTIFACT_FAILURES_COUNTER, "kind" => label).increment(1);
                return Err(e);
            }
        };

        // The guard stays armed until the entry exists
        let artifact = Artifact::new(filename, kind, size);
        self.registry.register_pending(artifact.clone(), guard).await?;

        metrics::counter!(ARTIFACTS_CREATED_COUNTER, "kind" => label).increment(1);
        debug!(filename = %artifact.filename, size, kind = label, "Artifact registered");
        Ok(artifact)
    }

    /// Capture one JPEG per timestamp, in order. Failures are per timestamp.
    pub async fn take_screenshots(&self, input: &Path, timestamps: &[f64]) -> ScreenshotOutcome {
        let mut outcome = ScreenshotOutcome::default();

        for &timestamp in timestamps {
            // Whole seconds in the name, as clients expect
            let filename = StorageRoot::unique_name("screenshot", &format!("_{}.jpg", timestamp as u64));
            let toolkit = Arc::clone(&self.toolkit);
            let result = self
                .produce(filename, ArtifactKind::Screenshot { timestamp }, |out| async move {
                    toolkit.extract_frame(input, timestamp, &out).await
                })
                .await;

            match result {
                Ok(artifact) => {
                    let url = self.url_for(&artifact.filename);
                    outcome.records.push(ScreenshotRecord {
                        timestamp,
                        filename: artifact.filename,
                        file_size: artifact.size_bytes,
                        url,
                    });
                }
                Err(e) => {
                    let e = e.into_screenshot_failure(timestamp);
                    warn!(timestamp, error = %e, "Screenshot failed");
                    outcome.failures.push(ScreenshotFailure {
                        timestamp,
                        error: e.to_string(),
                    });
                    outcome.first_error.get_or_insert(e);
                }
            }
        }

        info!(
            taken = outcome.records.len(),
            failed = outcome.failures.len(),
            "Screenshot capture completed"
        );
        outcome
    }

    /// Convert `input` to `format`.
    pub async fn convert(
        &self,
        input: &Path,
        kind: MediaKind,
        format: &str,
        quality: Quality,
        resolution: Option<&ResolvedResolution>,
    ) -> MediaResult<ConversionRecord> {
        self.check_output_format(kind, format)?;

        let prefix = match kind {
            MediaKind::Video => "converted",
            MediaKind::Audio => "converted_audio",
        };
        let filename = StorageRoot::unique_name(prefix, &format!(".{}", format));
        let resolution_label = resolution
            .map(|r| r.label.clone())
            .unwrap_or_else(|| "original".to_string());
        let spec = TranscodeSpec {
            kind,
            format: format.to_string(),
            quality,
            resolution: resolution
                .filter(|_| kind == MediaKind::Video)
                .map(|r| r.dimensions),
        };

        info!(format, quality = %quality, resolution = %resolution_label, "Converting media");
        let toolkit = Arc::clone(&self.toolkit);
        let artifact = self
            .produce(
                filename,
                ArtifactKind::Conversion {
                    format: format.to_string(),
                    resolution_label: resolution_label.clone(),
                },
                |out| async move { toolkit.transcode(input, &spec, &out).await },
            )
            .await
            .map_err(MediaError::into_conversion_failure)?;

        Ok(ConversionRecord {
            url: self.url_for(&artifact.filename),
            filename: artifact.filename,
            file_size: artifact.size_bytes,
            format: format.to_string(),
            resolution: resolution_label,
        })
    }

    /// Mix a music track into a video's soundtrack.
    pub async fn mix(&self, video: &Path, music: &Path, spec: &MixSpec) -> MediaResult<OutputRecord> {
        let toolkit = Arc::clone(&self.toolkit);
        let artifact = self
            .produce(
                StorageRoot::unique_name("bgm", ".mp4"),
                ArtifactKind::Mix,
                |out| async move { toolkit.mix_audio(video, music, spec, &out).await },
            )
            .await?;
        Ok(self.output_record(artifact))
    }

    /// Join several videos into one.
    pub async fn concat(&self, inputs: &[PathBuf], spec: &ConcatSpec) -> MediaResult<OutputRecord> {
        let toolkit = Arc::clone(&self.toolkit);
        let artifact = self
            .produce(
                StorageRoot::unique_name("concat", ".mp4"),
                ArtifactKind::Concat,
                |out| async move { toolkit.concat(inputs, spec, &out).await },
            )
            .await?;
        Ok(self.output_record(artifact))
    }

    /// Burn in or mux a subtitle track.
    pub async fn subtitle(
        &self,
        video: &Path,
        subtitles: &Path,
        spec: &SubtitleSpec,
    ) -> MediaResult<OutputRecord> {
        let prefix = match spec.mode {
            SubtitleMode::Hard => "sub_hard",
            SubtitleMode::Soft => "sub_soft",
        };
        let toolkit = Arc::clone(&self.toolkit);
        let artifact = self
            .produce(
                StorageRoot::unique_name(prefix, ".mp4"),
                ArtifactKind::Subtitled {
                    mode: spec.mode.as_str().to_string(),
                },
                |out| async move { toolkit.add_subtitles(video, subtitles, spec, &out).await },
            )
            .await?;
        Ok(self.output_record(artifact))
    }

    /// Cut a section out of `input`. Video becomes MP4, audio M4A.
    pub async fn trim(&self, input: &Path, spec: &TrimSpec) -> MediaResult<OutputRecord> {
        let suffix = match spec.kind {
            MediaKind::Video => ".mp4",
            MediaKind::Audio => ".m4a",
        };
        let toolkit = Arc::clone(&self.toolkit);
        let artifact = self
            .produce(
                StorageRoot::unique_name("trim", suffix),
                ArtifactKind::Trim,
                |out| async move { toolkit.trim(input, spec, &out).await },
            )
            .await?;
        Ok(self.output_record(artifact))
    }

    fn output_record(&self, artifact: Artifact) -> OutputRecord {
        OutputRecord {
            url: self.url_for(&artifact.filename),
            filename: artifact.filename,
            file_size: artifact.size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoints() {
        assert_eq!(
            plan_screenshot_timestamps(100.0, None, Some(4)),
            vec![12.5, 37.5, 62.5, 87.5]
        );
        assert_eq!(plan_screenshot_timestamps(10.0, None, Some(1)), vec![5.0]);
    }

    #[test]
    fn test_default_fractions() {
        assert_eq!(
            plan_screenshot_timestamps(20.0, None, None),
            vec![5.0, 10.0, 15.0]
        );
    }

    #[test]
    fn test_explicit_timestamps_win_and_are_filtered() {
        let explicit = [0.0, 5.0, 10.0, 12.0, -1.0, f64::NAN, 9.999];
        assert_eq!(
            plan_screenshot_timestamps(10.0, Some(&explicit), Some(3)),
            vec![0.0, 5.0, 9.999]
        );
    }

    #[test]
    fn test_empty_explicit_list_falls_through() {
        assert_eq!(
            plan_screenshot_timestamps(8.0, Some(&[]), Some(2)),
            vec![2.0, 6.0]
        );
    }

    #[test]
    fn test_unknown_duration_yields_nothing() {
        assert!(plan_screenshot_timestamps(0.0, None, None).is_empty());
        assert!(plan_screenshot_timestamps(f64::NAN, Some(&[1.0]), None).is_empty());
    }
}
