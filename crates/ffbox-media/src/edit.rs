//! Multi-step edits.
//!
//! Steps run in order against one working file. The working file starts as the
//! only input, or is first produced by a concat step. Every step output is a
//! registered artifact; when the edit finishes, outputs the result does not
//! reference are deleted, and when it fails, everything it created is.

use std::path::{Path, PathBuf};

use ffbox_models::encoding::{
    CONCAT_DEFAULT_CRF, CONCAT_DEFAULT_PRESET, CONCAT_MAX_INPUTS, DEFAULT_BGM_GAIN,
    EDIT_MAX_OPERATIONS, SUBTITLE_DEFAULT_CRF, SUBTITLE_DEFAULT_PRESET,
};
use ffbox_models::{
    BgmStep, ConcatStep, ConversionRecord, ConvertStep, EditOperation, EditResult, MediaInfo,
    MediaKind, OutputRecord, ScreenshotRecord, ScreenshotStep, SubtitleStep, TrimStep,
};
use tracing::{debug, info, warn};

use crate::acquire::{LocalMediaFile, MediaSource};
use crate::error::{MediaError, MediaResult};
use crate::generator::plan_screenshot_timestamps;
use crate::pipeline::{ConcatOptions, MediaPipeline};
use crate::resolution::{needs_source_dimensions, resolve_resolution};
use crate::toolkit::{MixMode, MixSpec, SubtitleMode, SubtitleSpec, TrimSpec};

/// Counter of edit requests, labelled by outcome.
pub const EDITS_COUNTER: &str = "ffbox_edits_total";

const DEFAULT_CONVERT_FORMAT: &str = "mp4";

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Check step order and fields before anything is downloaded.
pub fn validate_edit_plan(input_count: usize, operations: &[EditOperation]) -> MediaResult<()> {
    if input_count == 0 {
        return Err(MediaError::invalid_request("inputs must not be empty"));
    }
    if input_count > CONCAT_MAX_INPUTS {
        return Err(MediaError::invalid_request(format!(
            "Too many inputs (max {})",
            CONCAT_MAX_INPUTS
        )));
    }
    if operations.is_empty() {
        return Err(MediaError::invalid_request("operations must not be empty"));
    }
    if operations.len() > EDIT_MAX_OPERATIONS {
        return Err(MediaError::invalid_request(format!(
            "Too many operations (max {})",
            EDIT_MAX_OPERATIONS
        )));
    }

    let mut has_working = input_count == 1;
    for op in operations {
        op.validate_fields()
            .map_err(|e| MediaError::invalid_request(format!("{}: {}", op.name(), e)))?;
        match op {
            EditOperation::Concat(_) if input_count < 2 => {
                return Err(MediaError::invalid_request("concat requires inputs >= 2"));
            }
            EditOperation::Subtitle(_) if !has_working => {
                return Err(MediaError::invalid_request(
                    "subtitle requires a video (concat or single input first)",
                ));
            }
            EditOperation::Subtitle(step) if blank_to_none(step.subtitle_url.as_deref()).is_none() => {
                return Err(MediaError::invalid_request("subtitle_url is required"));
            }
            EditOperation::Bgm(_) if !has_working => {
                return Err(MediaError::invalid_request(
                    "bgm requires a video (concat or single input first)",
                ));
            }
            EditOperation::Bgm(step) if blank_to_none(step.bgm_url.as_deref()).is_none() => {
                return Err(MediaError::invalid_request("bgm_url is required"));
            }
            EditOperation::Trim(_) if !has_working => {
                return Err(MediaError::invalid_request("trim requires a media first"));
            }
            EditOperation::Trim(step) => {
                step.section_length().map_err(MediaError::InvalidRequest)?;
            }
            EditOperation::Convert(_) if !has_working => {
                return Err(MediaError::invalid_request("convert requires a media first"));
            }
            EditOperation::Screenshot(_) if !has_working => {
                return Err(MediaError::invalid_request("screenshot requires a video first"));
            }
            _ => {}
        }
        has_working |= op.produces_media();
    }

    if !operations.iter().any(EditOperation::produces_media) {
        return Err(MediaError::invalid_request("No output produced"));
    }
    Ok(())
}

/// The file the next step reads.
enum Working<'a> {
    Input(&'a LocalMediaFile),
    Artifact {
        record: OutputRecord,
        path: PathBuf,
        kind: MediaKind,
    },
}

impl Working<'_> {
    fn path(&self) -> &Path {
        match self {
            Working::Input(input) => input.path(),
            Working::Artifact { path, .. } => path,
        }
    }

    fn kind(&self) -> MediaKind {
        match self {
            Working::Input(input) => input.kind(),
            Working::Artifact { kind, .. } => *kind,
        }
    }
}

/// One edit in progress.
struct EditRun<'a> {
    pipeline: &'a MediaPipeline,
    inputs: &'a [LocalMediaFile],
    working: Option<Working<'a>>,
    /// Every artifact registered so far, in creation order
    created: Vec<String>,
    result_steps: Vec<String>,
    screenshots: Vec<ScreenshotRecord>,
    metadata: Option<MediaInfo>,
    conversion: Option<ConversionRecord>,
}

impl<'a> EditRun<'a> {
    fn new(pipeline: &'a MediaPipeline, inputs: &'a [LocalMediaFile]) -> Self {
        Self {
            pipeline,
            inputs,
            working: match inputs {
                [only] => Some(Working::Input(only)),
                _ => None,
            },
            created: Vec::new(),
            result_steps: Vec::new(),
            screenshots: Vec::new(),
            metadata: None,
            conversion: None,
        }
    }

    fn working(&self, requirement: &str) -> MediaResult<&Working<'a>> {
        self.working
            .as_ref()
            .ok_or_else(|| MediaError::invalid_request(requirement.to_string()))
    }

    fn working_video(&self, requirement: &str) -> MediaResult<&Working<'a>> {
        let working = self.working(requirement)?;
        if working.kind() != MediaKind::Video {
            return Err(MediaError::invalid_request(requirement.to_string()));
        }
        Ok(working)
    }

    /// Make `record` the working file.
    fn advance(&mut self, record: OutputRecord, kind: MediaKind) -> MediaResult<()> {
        self.created.push(record.filename.clone());
        let path = self.pipeline.registry().root().resolve(&record.filename)?;
        self.working = Some(Working::Artifact { record, path, kind });
        Ok(())
    }

    async fn run(&mut self, op: &EditOperation) -> MediaResult<()> {
        debug!(step = op.name(), "Running edit step");
        match op {
            EditOperation::Concat(step) => self.concat(step).await?,
            EditOperation::Trim(step) => self.trim(step).await?,
            EditOperation::Subtitle(step) => self.subtitle(step).await?,
            EditOperation::Bgm(step) => self.bgm(step).await?,
            EditOperation::Convert(step) => self.convert(step).await?,
            EditOperation::Screenshot(step) => self.screenshot(step).await?,
            EditOperation::Metadata => self.metadata().await?,
        }
        self.result_steps.push(op.name().to_string());
        Ok(())
    }

    async fn concat(&mut self, step: &ConcatStep) -> MediaResult<()> {
        if self.inputs.len() < 2 {
            return Err(MediaError::invalid_request("concat requires inputs >= 2"));
        }
        let options = ConcatOptions {
            resolution: blank_to_none(step.resolution.as_deref())
                .filter(|r| !r.eq_ignore_ascii_case("original"))
                .map(str::to_string),
            fps: step.fps,
            crf: step.crf.unwrap_or(CONCAT_DEFAULT_CRF),
            preset: blank_to_none(step.preset.as_deref())
                .unwrap_or(CONCAT_DEFAULT_PRESET)
                .to_ascii_lowercase(),
            mute: step.mute,
        };
        let outcome = self.pipeline.concat(self.inputs, &options).await?;
        self.advance(outcome.output, MediaKind::Video)
    }

    async fn trim(&mut self, step: &TrimStep) -> MediaResult<()> {
        let working = self.working("trim requires a media first")?;
        let spec = TrimSpec {
            kind: working.kind(),
            start: step.start,
            duration: step.section_length().map_err(MediaError::InvalidRequest)?,
        };
        let record = self
            .pipeline
            .generator()
            .trim(working.path(), &spec)
            .await?;
        self.advance(record, spec.kind)
    }

    async fn subtitle(&mut self, step: &SubtitleStep) -> MediaResult<()> {
        let requirement = "subtitle requires a video (concat or single input first)";
        self.working_video(requirement)?;
        let url = blank_to_none(step.subtitle_url.as_deref())
            .ok_or_else(|| MediaError::invalid_request("subtitle_url is required"))?;
        let subtitles = self
            .pipeline
            .acquirer()
            .acquire_subtitles(MediaSource::RemoteUrl(url.to_string()))
            .await?;

        let spec = SubtitleSpec {
            mode: step
                .mode
                .as_deref()
                .map(SubtitleMode::parse)
                .unwrap_or_default(),
            fonts_dir: blank_to_none(step.fonts_dir.as_deref()).map(PathBuf::from),
            crf: step.crf.unwrap_or(SUBTITLE_DEFAULT_CRF),
            preset: blank_to_none(step.preset.as_deref())
                .unwrap_or(SUBTITLE_DEFAULT_PRESET)
                .to_ascii_lowercase(),
            language: blank_to_none(step.language.as_deref()).map(str::to_string),
        };
        let working = self.working_video(requirement)?;
        let record = self
            .pipeline
            .subtitles_at(working.path(), working.kind(), &subtitles, &spec)
            .await?;
        self.advance(record, MediaKind::Video)
    }

    async fn bgm(&mut self, step: &BgmStep) -> MediaResult<()> {
        let requirement = "bgm requires a video (concat or single input first)";
        self.working_video(requirement)?;
        let url = blank_to_none(step.bgm_url.as_deref())
            .ok_or_else(|| MediaError::invalid_request("bgm_url is required"))?;
        let music = self
            .pipeline
            .acquirer()
            .acquire(MediaSource::RemoteUrl(url.to_string()))
            .await?;

        let spec = MixSpec {
            mode: step.mode.as_deref().map(MixMode::parse).unwrap_or_default(),
            bgm_gain: step.bgm_gain.unwrap_or(DEFAULT_BGM_GAIN),
        };
        let working = self.working_video(requirement)?;
        let record = self
            .pipeline
            .mix_at(working.path(), working.kind(), music.path(), &spec)
            .await?;
        self.advance(record, MediaKind::Video)
    }

    async fn convert(&mut self, step: &ConvertStep) -> MediaResult<()> {
        let working = self.working("convert requires a media first")?;
        let kind = working.kind();
        let format = blank_to_none(step.format.as_deref())
            .map(|f| f.trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_CONVERT_FORMAT.to_string());
        self.pipeline.generator().check_output_format(kind, &format)?;

        let spec = blank_to_none(step.resolution.as_deref())
            .filter(|r| !r.eq_ignore_ascii_case("original"))
            .filter(|_| kind == MediaKind::Video);
        let source = match spec {
            Some(s) if needs_source_dimensions(s) => self
                .pipeline
                .toolkit()
                .probe(working.path(), kind)
                .await
                .ok()
                .and_then(|info| info.dimensions()),
            _ => None,
        };
        let resolution = resolve_resolution(spec, source)?;

        let record = self
            .pipeline
            .generator()
            .convert(working.path(), kind, &format, step.quality, resolution.as_ref())
            .await?;
        let output = OutputRecord {
            filename: record.filename.clone(),
            file_size: record.file_size,
            url: record.url.clone(),
        };
        self.conversion = Some(record);
        self.advance(output, kind)
    }

    async fn screenshot(&mut self, step: &ScreenshotStep) -> MediaResult<()> {
        let working = self.working_video("screenshot requires a video first")?;
        let info = self
            .pipeline
            .toolkit()
            .probe(working.path(), MediaKind::Video)
            .await?;
        let timestamps =
            plan_screenshot_timestamps(info.duration(), step.timestamps.as_deref(), step.count);
        if timestamps.is_empty() {
            return Err(MediaError::invalid_request(
                "No screenshot timestamps fall within the media duration",
            ));
        }

        let outcome = self
            .pipeline
            .generator()
            .take_screenshots(working.path(), &timestamps)
            .await;
        self.created
            .extend(outcome.records.iter().map(|r| r.filename.clone()));
        if outcome.records.is_empty() {
            if let Some(err) = outcome.first_error {
                return Err(err);
            }
        }
        self.screenshots.extend(outcome.records);
        Ok(())
    }

    async fn metadata(&mut self) -> MediaResult<()> {
        let (path, kind) = match (&self.working, self.inputs.first()) {
            (Some(working), _) => (working.path(), working.kind()),
            (None, Some(first)) => (first.path(), first.kind()),
            (None, None) => return Err(MediaError::MissingInput),
        };
        self.metadata = Some(self.pipeline.toolkit().probe(path, kind).await?);
        Ok(())
    }

    async fn finish(self) -> MediaResult<EditResult> {
        let EditRun {
            pipeline,
            working,
            created,
            result_steps,
            screenshots,
            metadata,
            conversion,
            ..
        } = self;
        let output = match working {
            Some(Working::Artifact { record, .. }) => record,
            _ => return Err(MediaError::invalid_request("No output produced")),
        };
        let result = EditResult {
            output,
            steps: result_steps,
            screenshots,
            metadata,
            conversion,
        };

        let referenced = result.artifact_filenames();
        let intermediates: Vec<&String> = created
            .iter()
            .filter(|name| !referenced.contains(&name.as_str()))
            .collect();
        debug!(count = intermediates.len(), "Removing edit intermediates");
        discard(pipeline, intermediates.into_iter()).await;
        Ok(result)
    }
}

/// Delete `names`, logging rather than failing.
async fn discard<'n>(pipeline: &MediaPipeline, names: impl Iterator<Item = &'n String>) {
    for name in names {
        if let Err(e) = pipeline.registry().delete(name).await {
            warn!(filename = %name, error = %e, "Failed to delete edit output");
        }
    }
}

impl MediaPipeline {
    /// Run `operations` in order over `inputs`.
    pub async fn edit(
        &self,
        inputs: &[LocalMediaFile],
        operations: &[EditOperation],
    ) -> MediaResult<EditResult> {
        validate_edit_plan(inputs.len(), operations)?;
        info!(
            inputs = inputs.len(),
            steps = operations.len(),
            "Running edit"
        );

        let mut run = EditRun::new(self, inputs);
        for op in operations {
            if let Err(e) = run.run(op).await {
                warn!(step = op.name(), error = %e, "Edit step failed");
                discard(self, run.created.iter()).await;
                metrics::counter!(EDITS_COUNTER, "outcome" => "failure").increment(1);
                return Err(e);
            }
        }

        let result = run.finish().await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(EDITS_COUNTER, "outcome" => outcome).increment(1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtitle(url: Option<&str>) -> EditOperation {
        EditOperation::Subtitle(SubtitleStep {
            subtitle_url: url.map(str::to_string),
            ..Default::default()
        })
    }

    fn message(result: MediaResult<()>) -> String {
        match result {
            Err(MediaError::InvalidRequest(msg)) => msg,
            other => panic!("expected invalid request, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_order_rules() {
        let concat = EditOperation::Concat(ConcatStep::default());
        let shot = EditOperation::Screenshot(ScreenshotStep::default());

        assert_eq!(
            message(validate_edit_plan(1, &[concat.clone()])),
            "concat requires inputs >= 2"
        );
        assert_eq!(
            message(validate_edit_plan(2, &[subtitle(Some("https://x/a.srt"))])),
            "subtitle requires a video (concat or single input first)"
        );
        assert_eq!(
            message(validate_edit_plan(1, &[subtitle(Some("  "))])),
            "subtitle_url is required"
        );
        assert_eq!(
            message(validate_edit_plan(
                1,
                &[EditOperation::Bgm(BgmStep::default())]
            )),
            "bgm_url is required"
        );
        assert_eq!(
            message(validate_edit_plan(2, &[shot.clone()])),
            "screenshot requires a video first"
        );
        assert_eq!(
            message(validate_edit_plan(
                2,
                &[EditOperation::Convert(ConvertStep::default())]
            )),
            "convert requires a media first"
        );
        assert_eq!(
            message(validate_edit_plan(1, &[shot.clone(), EditOperation::Metadata])),
            "No output produced"
        );

        assert!(validate_edit_plan(2, &[concat, subtitle(Some("https://x/a.srt")), shot]).is_ok());
    }

    #[test]
    fn test_plan_limits_and_fields() {
        assert_eq!(
            message(validate_edit_plan(0, &[EditOperation::Metadata])),
            "inputs must not be empty"
        );
        assert_eq!(
            message(validate_edit_plan(1, &[])),
            "operations must not be empty"
        );
        let many = vec![EditOperation::Metadata; EDIT_MAX_OPERATIONS + 1];
        assert!(message(validate_edit_plan(1, &many)).starts_with("Too many operations"));

        let bad_trim = EditOperation::Trim(TrimStep {
            start: 3.0,
            end: Some(1.0),
            duration: None,
        });
        assert_eq!(
            message(validate_edit_plan(1, &[bad_trim])),
            "trim end must be after start"
        );

        let bad_preset = EditOperation::Concat(ConcatStep {
            preset: Some("warp".into()),
            ..Default::default()
        });
        assert!(message(validate_edit_plan(2, &[bad_preset])).starts_with("concat: "));
    }
}
