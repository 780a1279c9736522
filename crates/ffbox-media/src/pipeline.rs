//! Request orchestration.
//!
//! Acquisition, resolution and output-format problems abort a request. Info,
//! screenshot and conversion failures are collected: the request succeeds with
//! partial data as long as one requested operation succeeded, otherwise the
//! first failure is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ffbox_models::encoding::{CONCAT_MAX_INPUTS, CONCAT_MIN_INPUTS};
use ffbox_models::{
    Artifact, MediaInfo, MediaKind, OperationFailure, OutputRecord, ProcessingOptions,
    ProcessingResult,
};
use ffbox_storage::ArtifactRegistry;
use tracing::{info, warn};

use crate::acquire::{InputAcquirer, LocalMediaFile, LocalSubtitleFile, MediaSource};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::generator::{plan_screenshot_timestamps, ArtifactGenerator};
use crate::resolution::{needs_source_dimensions, resolve_resolution};
use crate::toolkit::{ConcatSpec, MediaToolkit, MixSpec, SubtitleSpec};

/// Counter of processed requests, labelled by outcome.
pub const REQUESTS_PROCESSED_COUNTER: &str = "ffbox_requests_processed_total";

/// A validated request: where the input comes from and what to do with it.
pub struct ProcessingRequest<'a> {
    pub source: MediaSource<'a>,
    pub options: ProcessingOptions,
}

/// Options for joining several videos.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatOptions {
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    pub crf: u8,
    pub preset: String,
    pub mute: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatOutcome {
    pub output: OutputRecord,
    pub count: usize,
    /// Requested resolution spec, or `original`
    pub resolution: String,
}

/// Tracks which requested operations succeeded.
#[derive(Default)]
struct OperationTally {
    requested: usize,
    succeeded: usize,
    first_error: Option<MediaError>,
}

impl OperationTally {
    fn success(&mut self) {
        self.requested += 1;
        self.succeeded += 1;
    }

    fn failure(&mut self, result: &mut ProcessingResult, operation: &str, err: MediaError) {
        warn!(operation, error = %err, "Operation failed");
        self.requested += 1;
        result.failures.push(OperationFailure {
            operation: operation.to_string(),
            error: err.to_string(),
        });
        self.first_error.get_or_insert(err);
    }
}

#[derive(Clone)]
pub struct MediaPipeline {
    acquirer: InputAcquirer,
    generator: ArtifactGenerator,
    toolkit: Arc<dyn MediaToolkit>,
    registry: Arc<ArtifactRegistry>,
}

impl MediaPipeline {
    pub fn new(
        config: MediaConfig,
        registry: Arc<ArtifactRegistry>,
        toolkit: Arc<dyn MediaToolkit>,
    ) -> MediaResult<Self> {
        let acquirer = InputAcquirer::new(registry.root().clone(), config.clone())?;
        let generator = ArtifactGenerator::new(Arc::clone(&toolkit), Arc::clone(&registry), config);
        Ok(Self {
            acquirer,
            generator,
            toolkit,
            registry,
        })
    }

    pub fn acquirer(&self) -> &InputAcquirer {
        &self.acquirer
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    pub(crate) fn generator(&self) -> &ArtifactGenerator {
        &self.generator
    }

    pub(crate) fn toolkit(&self) -> &Arc<dyn MediaToolkit> {
        &self.toolkit
    }

    /// Acquire the input and run the requested operations.
    pub async fn process(&self, request: ProcessingRequest<'_>) -> MediaResult<ProcessingResult> {
        let input = self.acquirer.acquire(request.source).await?;
        // `input` is deleted when it drops at the end of this call
        self.process_acquired(&input, &request.options).await
    }

    /// Run the requested operations against an already acquired input.
    pub async fn process_acquired(
        &self,
        input: &LocalMediaFile,
        options: &ProcessingOptions,
    ) -> MediaResult<ProcessingResult> {
        let result = self.run_operations(input, options).await;
        let outcome = match &result {
            Ok(r) if r.failures.is_empty() => "success",
            Ok(_) => "partial",
            Err(_) => "failure",
        };
        metrics::counter!(REQUESTS_PROCESSED_COUNTER, "outcome" => outcome).increment(1);
        result
    }

    async fn run_operations(
        &self,
        input: &LocalMediaFile,
        options: &ProcessingOptions,
    ) -> MediaResult<ProcessingResult> {
        let kind = input.kind();
        let mut result = ProcessingResult::new(kind);
        let mut tally = OperationTally::default();

        // Validation that must abort before any tool runs
        if let Some(format) = options.convert_format.as_deref() {
            self.generator.check_output_format(kind, format)?;
        }
        let resolution_spec = match (kind, options.convert_resolution.as_deref()) {
            (MediaKind::Audio, Some(_)) if options.convert_format.is_some() => {
                result
                    .warnings
                    .push("Resolution is ignored for audio files".to_string());
                None
            }
            (MediaKind::Video, spec) if options.convert_format.is_some() => spec,
            _ => None,
        };
        let deferred_resolution = resolution_spec.filter(|s| needs_source_dimensions(s));
        let mut resolution = match resolution_spec {
            Some(spec) if deferred_resolution.is_none() => resolve_resolution(Some(spec), None)?,
            _ => None,
        };

        let wants_screenshots = options.take_screenshots && kind == MediaKind::Video;
        if options.take_screenshots && kind == MediaKind::Audio {
            result
                .warnings
                .push("Screenshots not supported for audio files".to_string());
        }

        // Probe once for everything that needs it
        let needs_probe = options.extract_info || wants_screenshots || deferred_resolution.is_some();
        let probe: Option<MediaResult<MediaInfo>> = if needs_probe {
            Some(self.toolkit.probe(input.path(), kind).await)
        } else {
            None
        };
        let info = probe.as_ref().and_then(|p| p.as_ref().ok());

        if let Some(spec) = deferred_resolution {
            resolution = resolve_resolution(Some(spec), info.and_then(MediaInfo::dimensions))?;
        }

        if options.extract_info {
            match probe {
                Some(Ok(ref info)) => {
                    result.info = Some(info.clone());
                    tally.success();
                }
                Some(Err(ref e)) => tally.failure(&mut result, "info", clone_probe_error(e)),
                None => {}
            }
        }

        if wants_screenshots {
            match info {
                Some(info) => {
                    let timestamps = plan_screenshot_timestamps(
                        info.duration(),
                        options.screenshot_timestamps.as_deref(),
                        options.screenshot_count,
                    );
                    if timestamps.is_empty() {
                        result
                            .warnings
                            .push("No screenshot timestamps fall within the media duration".to_string());
                    }
                    let outcome = self.generator.take_screenshots(input.path(), &timestamps).await;
                    let all_failed = outcome.records.is_empty() && !outcome.failures.is_empty();
                    result.screenshots = Some(outcome.records);
                    result.screenshot_failures = outcome.failures;
                    match outcome.first_error {
                        Some(e) if all_failed => tally.failure(&mut result, "screenshots", e),
                        _ => tally.success(),
                    }
                }
                None => {
                    let err = match &probe {
                        Some(Err(e)) => clone_probe_error(e),
                        _ => MediaError::probe_failed("media duration unavailable", None),
                    };
                    tally.failure(&mut result, "screenshots", err);
                }
            }
        }

        if let Some(format) = options.convert_format.as_deref() {
            match self
                .generator
                .convert(
                    input.path(),
                    kind,
                    format,
                    options.convert_quality,
                    resolution.as_ref(),
                )
                .await
            {
                Ok(record) => {
                    result.conversion = Some(record);
                    tally.success();
                }
                Err(e) => tally.failure(&mut result, "conversion", e),
            }
        }

        if tally.requested > 0 && tally.succeeded == 0 {
            if let Some(err) = tally.first_error {
                return Err(err);
            }
        }

        info!(
            media_type = %kind,
            requested = tally.requested,
            succeeded = tally.succeeded,
            "Processing completed"
        );
        Ok(result)
    }

    /// Acquire and probe only.
    pub async fn inspect(&self, source: MediaSource<'_>) -> MediaResult<ProcessingResult> {
        let input = self.acquirer.acquire(source).await?;
        self.inspect_acquired(&input).await
    }

    pub async fn inspect_acquired(&self, input: &LocalMediaFile) -> MediaResult<ProcessingResult> {
        let info = self.toolkit.probe(input.path(), input.kind()).await?;
        let mut result = ProcessingResult::new(input.kind());
        result.info = Some(info);
        Ok(result)
    }

    /// Mix background music into a video.
    pub async fn mix_background(
        &self,
        video: &LocalMediaFile,
        music: &LocalMediaFile,
        spec: &MixSpec,
    ) -> MediaResult<OutputRecord> {
        self.mix_at(video.path(), video.kind(), music.path(), spec).await
    }

    pub(crate) async fn mix_at(
        &self,
        video: &Path,
        kind: MediaKind,
        music: &Path,
        spec: &MixSpec,
    ) -> MediaResult<OutputRecord> {
        if kind != MediaKind::Video {
            return Err(MediaError::invalid_request("Need a video input for background music"));
        }
        if !spec.bgm_gain.is_finite() || spec.bgm_gain < 0.0 {
            return Err(MediaError::invalid_request("bgm_gain must be a non-negative number"));
        }
        info!(mode = spec.mode.as_str(), bgm_gain = spec.bgm_gain, "Mixing background music");
        self.generator.mix(video, music, spec).await
    }

    /// Burn in or attach a subtitle track.
    pub async fn apply_subtitles(
        &self,
        video: &LocalMediaFile,
        subtitles: &LocalSubtitleFile,
        spec: &SubtitleSpec,
    ) -> MediaResult<OutputRecord> {
        self.subtitles_at(video.path(), video.kind(), subtitles, spec).await
    }

    pub(crate) async fn subtitles_at(
        &self,
        video: &Path,
        kind: MediaKind,
        subtitles: &LocalSubtitleFile,
        spec: &SubtitleSpec,
    ) -> MediaResult<OutputRecord> {
        if kind != MediaKind::Video {
            return Err(MediaError::invalid_request("Need a video input for subtitles"));
        }
        if let Some(dir) = &spec.fonts_dir {
            let is_dir = tokio::fs::metadata(dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                return Err(MediaError::invalid_request(format!(
                    "fonts_dir is not a directory: {}",
                    dir.display()
                )));
            }
        }
        info!(
            mode = spec.mode.as_str(),
            format = subtitles.format(),
            "Applying subtitles"
        );
        self.generator.subtitle(video, subtitles.path(), spec).await
    }

    /// Concatenate 2 to 10 videos.
    pub async fn concat(
        &self,
        inputs: &[LocalMediaFile],
        options: &ConcatOptions,
    ) -> MediaResult<ConcatOutcome> {
        if inputs.len() < CONCAT_MIN_INPUTS {
            return Err(MediaError::invalid_request(
                "Need at least 2 videos (files[] or urls[])",
            ));
        }
        if inputs.len() > CONCAT_MAX_INPUTS {
            return Err(MediaError::invalid_request("Too many inputs (max 10)"));
        }
        if let Some(bad) = inputs.iter().position(|i| i.kind() != MediaKind::Video) {
            return Err(MediaError::invalid_request(format!(
                "Input {} is not a video",
                bad + 1
            )));
        }

        let spec_str = options.resolution.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let source_dims = match spec_str {
            Some(spec) if needs_source_dimensions(spec) => self
                .toolkit
                .probe(inputs[0].path(), MediaKind::Video)
                .await
                .ok()
                .and_then(|info| info.dimensions()),
            _ => None,
        };
        let resolution = resolve_resolution(spec_str, source_dims)?;

        let spec = ConcatSpec {
            resolution: resolution.as_ref().map(|r| r.dimensions),
            fps: options.fps,
            crf: options.crf,
            preset: options.preset.clone(),
            mute: options.mute,
        };
        let paths: Vec<PathBuf> = inputs.iter().map(|i| i.path().to_path_buf()).collect();
        info!(count = paths.len(), mute = spec.mute, "Concatenating videos");
        let output = self.generator.concat(&paths, &spec).await?;

        Ok(ConcatOutcome {
            output,
            count: paths.len(),
            resolution: resolution
                .map(|r| r.label)
                .unwrap_or_else(|| "original".to_string()),
        })
    }

    /// Look up a registered artifact for download.
    pub async fn fetch_artifact(&self, filename: &str) -> MediaResult<(Artifact, PathBuf)> {
        Ok(self.registry.locate(filename).await?)
    }

    /// Delete an artifact (idempotent).
    pub async fn delete_artifact(&self, filename: &str) -> MediaResult<bool> {
        Ok(self.registry.delete(filename).await?)
    }
}

/// Probe errors are reported once per dependent operation.
fn clone_probe_error(err: &MediaError) -> MediaError {
    match err {
        MediaError::ProbeFailed { message, stderr } => MediaError::ProbeFailed {
            message: message.clone(),
            stderr: stderr.clone(),
        },
        MediaError::FfprobeNotFound => MediaError::FfprobeNotFound,
        MediaError::ProcessingFailed(msg) => MediaError::ProcessingFailed(msg.clone()),
        other => MediaError::probe_failed(other.to_string(), None),
    }
}
