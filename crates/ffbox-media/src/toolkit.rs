//! External media toolkit seam.
//!
//! [`MediaToolkit`] is everything the generators need from ffmpeg/ffprobe.
//! [`FfmpegToolkit`] is the production implementation; tests substitute a fake
//! that writes small files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ffbox_models::encoding::{
    audio_codec_for, BGM_AUDIO_BITRATE, CONCAT_DEFAULT_CRF, CONCAT_DEFAULT_PRESET,
    DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC, DEFAULT_VIDEO_CODEC, SCREENSHOT_JPEG_QUALITY,
};
use ffbox_models::{AudioQualityArg, CodecPair, MediaInfo, MediaKind, Quality};
use ffbox_storage::StorageRoot;
use tempfile::TempPath;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_media;
use crate::resolution::Dimensions;

/// Parameters for a format conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSpec {
    pub kind: MediaKind,
    /// Target container extension, e.g. `mp4`
    pub format: String,
    pub quality: Quality,
    /// Ignored for audio
    pub resolution: Option<Dimensions>,
}

/// How background music is combined with the original soundtrack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    /// Plain `amix` of both tracks
    #[default]
    Mix,
    /// Music is compressed whenever the original track is loud
    Ducking,
}

impl MixMode {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("ducking") {
            MixMode::Ducking
        } else {
            MixMode::Mix
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MixMode::Mix => "mix",
            MixMode::Ducking => "ducking",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixSpec {
    pub mode: MixMode,
    pub bgm_gain: f64,
}

impl MixSpec {
    /// `-filter_complex` graph producing `[outa]`.
    pub fn filter_graph(&self) -> String {
        match self.mode {
            MixMode::Ducking => format!(
                "[1:a]volume={}[b];[0:a][b]sidechaincompress=threshold=0.03:ratio=8:attack=5:release=200[outa]",
                self.bgm_gain
            ),
            MixMode::Mix => format!(
                "[0:a]volume=1.0[a0];[1:a]volume={}[a1];[a0][a1]amix=inputs=2:dropout_transition=2:normalize=1[outa]",
                self.bgm_gain
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatSpec {
    pub resolution: Option<Dimensions>,
    pub fps: Option<u32>,
    pub crf: u8,
    pub preset: String,
    /// Drop all audio
    pub mute: bool,
}

impl ConcatSpec {
    /// `-vf` chain applied while normalizing each input.
    pub fn normalize_filter(&self) -> Option<String> {
        let mut filters = Vec::new();
        if let Some(d) = self.resolution {
            filters.push(d.scale_filter());
        }
        if let Some(fps) = self.fps.filter(|f| *f > 0) {
            filters.push(format!("fps={}", fps));
        }
        (!filters.is_empty()).then(|| filters.join(","))
    }

    /// `-filter_complex` graph joining `n` normalized inputs.
    pub fn concat_graph(&self, n: usize) -> String {
        if self.mute {
            let inputs: String = (0..n).map(|i| format!("[{}:v:0]", i)).collect();
            format!("{}concat=n={}:v=1:a=0[outv]", inputs, n)
        } else {
            let inputs: String = (0..n).map(|i| format!("[{}:v:0][{}:a:0]", i, i)).collect();
            format!("{}concat=n={}:v=1:a=1[outv][outa]", inputs, n)
        }
    }
}

/// Burned into the picture, or muxed as a selectable track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtitleMode {
    #[default]
    Hard,
    Soft,
}

impl SubtitleMode {
    /// `soft` selects a text track; anything else burns in.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("soft") {
            SubtitleMode::Soft
        } else {
            SubtitleMode::Hard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleMode::Hard => "hard",
            SubtitleMode::Soft => "soft",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleSpec {
    pub mode: SubtitleMode,
    /// Extra font directory for libass (hard mode only)
    pub fonts_dir: Option<PathBuf>,
    /// Re-encode settings (hard mode only)
    pub crf: u8,
    pub preset: String,
    /// ISO 639 tag for the text track (soft mode only)
    pub language: Option<String>,
}

/// Escape a path for use as a filter option inside a filtergraph.
///
/// Two levels: the option value (`\`, `'`, `:`), then the graph (`\`, `'`,
/// `[`, `]`, `,`, `;`).
pub fn escape_filter_path(path: &Path) -> String {
    fn escape(input: &str, special: &[char]) -> String {
        let mut out = String::with_capacity(input.len());
        for c in input.chars() {
            if special.contains(&c) {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }
    let value = escape(&path.to_string_lossy(), &['\\', '\'', ':']);
    escape(&value, &['\\', '\'', '[', ']', ',', ';'])
}

impl SubtitleSpec {
    /// `-vf` filter burning `subtitles` into the picture.
    pub fn burn_filter(&self, subtitles: &Path) -> String {
        let mut filter = format!("subtitles={}", escape_filter_path(subtitles));
        if let Some(dir) = &self.fonts_dir {
            filter.push_str(":fontsdir=");
            filter.push_str(&escape_filter_path(dir));
        }
        filter
    }
}

/// Cut a section out of one input.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimSpec {
    pub kind: MediaKind,
    /// Seconds from the start of the input
    pub start: f64,
    /// Length of the section; `None` runs to the end
    pub duration: Option<f64>,
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe(&self, input: &Path, kind: MediaKind) -> MediaResult<MediaInfo>;

    /// Write one JPEG frame at `timestamp` seconds.
    async fn extract_frame(&self, input: &Path, timestamp: f64, output: &Path) -> MediaResult<()>;

    async fn transcode(&self, input: &Path, spec: &TranscodeSpec, output: &Path)
        -> MediaResult<()>;

    async fn mix_audio(
        &self,
        video: &Path,
        music: &Path,
        spec: &MixSpec,
        output: &Path,
    ) -> MediaResult<()>;

    async fn concat(&self, inputs: &[PathBuf], spec: &ConcatSpec, output: &Path)
        -> MediaResult<()>;

    async fn add_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        spec: &SubtitleSpec,
        output: &Path,
    ) -> MediaResult<()>;

    async fn trim(&self, input: &Path, spec: &TrimSpec, output: &Path) -> MediaResult<()>;
}

/// Build the command attaching `subtitles` to `video`.
pub fn subtitle_command(
    video: &Path,
    subtitles: &Path,
    spec: &SubtitleSpec,
    output: &Path,
) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(video, output);
    match spec.mode {
        SubtitleMode::Hard => cmd
            .video_filter(spec.burn_filter(subtitles))
            .video_codec(DEFAULT_VIDEO_CODEC)
            .crf(spec.crf)
            .preset(spec.preset.clone())
            .audio_codec("copy"),
        SubtitleMode::Soft => {
            let mut cmd = cmd
                .add_input(subtitles)
                .map("0:v")
                .map("0:a?")
                .map("1:s")
                .video_codec("copy")
                .audio_codec("copy")
                .output_args(["-c:s", "mov_text"]);
            if let Some(language) = &spec.language {
                cmd = cmd.output_args(["-metadata:s:s:0".to_string(), format!("language={}", language)]);
            }
            cmd
        }
    }
}

/// Build the command cutting a section out of `input`.
pub fn trim_command(input: &Path, spec: &TrimSpec, output: &Path) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output);
    if spec.start > 0.0 {
        cmd = cmd.seek(spec.start);
    }
    if let Some(duration) = spec.duration {
        cmd = cmd.duration(duration);
    }
    match spec.kind {
        MediaKind::Video => cmd
            .video_codec(DEFAULT_VIDEO_CODEC)
            .crf(CONCAT_DEFAULT_CRF)
            .preset(CONCAT_DEFAULT_PRESET)
            .audio_codec(DEFAULT_AUDIO_CODEC)
            .output_args(["-movflags", "+faststart"]),
        MediaKind::Audio => cmd
            .no_video()
            .audio_codec(DEFAULT_AUDIO_CODEC)
            .audio_bitrate(DEFAULT_AUDIO_BITRATE),
    }
}

/// Build the conversion command for a transcode spec.
pub fn transcode_command(input: &Path, spec: &TranscodeSpec, output: &Path) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(input, output);
    match spec.kind {
        MediaKind::Video => {
            let codecs = CodecPair::for_container(&spec.format);
            let mut cmd = cmd
                .video_codec(codecs.video)
                .audio_codec(codecs.audio)
                .crf(spec.quality.crf());
            if codecs.video == ffbox_models::encoding::WEBM_VIDEO_CODEC {
                // Constant-quality mode for VP9
                cmd = cmd.output_args(["-b:v", "0"]);
            }
            if let Some(d) = spec.resolution {
                cmd = cmd.video_filter(d.scale_filter());
            }
            cmd
        }
        MediaKind::Audio => {
            let mut cmd = cmd.no_video();
            if let Some(codec) = audio_codec_for(&spec.format) {
                cmd = cmd.audio_codec(codec);
            }
            cmd.output_args(AudioQualityArg::for_format(&spec.format, spec.quality).to_ffmpeg_args())
        }
    }
}

/// Production toolkit backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit {
    runner: FfmpegRunner,
}

impl FfmpegToolkit {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    async fn has_audio_stream(&self, path: &Path) -> bool {
        let args: Vec<String> = [
            "-v",
            "error",
            "-select_streams",
            "a",
            "-show_entries",
            "stream=index",
            "-of",
            "csv=p=0",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path.to_string_lossy().to_string()))
        .collect();
        match self.runner.probe(&args).await {
            Ok(stdout) => !String::from_utf8_lossy(&stdout).trim().is_empty(),
            Err(_) => false,
        }
    }

    /// Re-encode one concat input so every segment shares codecs and layout.
    async fn normalize_segment(
        &self,
        input: &Path,
        spec: &ConcatSpec,
        output: &Path,
    ) -> MediaResult<()> {
        let mut cmd = FfmpegCommand::new(input, output);
        if spec.mute {
            cmd = cmd.map("0:v:0").no_audio();
        } else if self.has_audio_stream(input).await {
            cmd = cmd.map("0:v:0").map("0:a:0");
        } else {
            // Silent track so the concat filter sees an audio pad for every input
            cmd = cmd
                .add_input("anullsrc=channel_layout=stereo:sample_rate=44100")
                .input_arg("-f")
                .input_arg("lavfi")
                .map("0:v:0")
                .map("1:a:0")
                .output_arg("-shortest");
        }
        cmd = cmd
            .video_codec(DEFAULT_VIDEO_CODEC)
            .preset(spec.preset.clone())
            .crf(spec.crf)
            .output_args(["-pix_fmt", "yuv420p"]);
        if !spec.mute {
            cmd = cmd
                .audio_codec(DEFAULT_AUDIO_CODEC)
                .output_args(["-ar", "44100", "-ac", "2"]);
        }
        if let Some(filter) = spec.normalize_filter() {
            cmd = cmd.video_filter(filter);
        }
        self.runner.run(&cmd).await
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, input: &Path, kind: MediaKind) -> MediaResult<MediaInfo> {
        probe_media(&self.runner, input, kind).await
    }

    async fn extract_frame(&self, input: &Path, timestamp: f64, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .seek(timestamp)
            .single_frame()
            .output_args(["-q:v".to_string(), SCREENSHOT_JPEG_QUALITY.to_string()]);
        self.runner.run(&cmd).await
    }

    async fn transcode(
        &self,
        input: &Path,
        spec: &TranscodeSpec,
        output: &Path,
    ) -> MediaResult<()> {
        let cmd = transcode_command(input, spec, output);
        self.runner.run(&cmd).await
    }

    async fn mix_audio(
        &self,
        video: &Path,
        music: &Path,
        spec: &MixSpec,
        output: &Path,
    ) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(video, output)
            .add_input(music)
            .filter_complex(spec.filter_graph())
            .map("0:v")
            .map("[outa]")
            .video_codec("copy")
            .audio_codec(DEFAULT_AUDIO_CODEC)
            .audio_bitrate(BGM_AUDIO_BITRATE);
        self.runner.run(&cmd).await
    }

    async fn concat(
        &self,
        inputs: &[PathBuf],
        spec: &ConcatSpec,
        output: &Path,
    ) -> MediaResult<()> {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));

        // Intermediates are removed when this vector drops
        let mut segments: Vec<TempPath> = Vec::with_capacity(inputs.len());
        for (idx, input) in inputs.iter().enumerate() {
            let path = dir.join(StorageRoot::unique_name("norm", &format!("_{}.mp4", idx + 1)));
            let segment = TempPath::from_path(&path);
            debug!(input = %input.display(), segment = %path.display(), "Normalizing concat input");
            self.normalize_segment(input, spec, &path).await?;
            segments.push(segment);
        }

        let Some((first, rest)) = segments.split_first() else {
            return Ok(());
        };
        let mut cmd = FfmpegCommand::new(first, output);
        for segment in rest {
            cmd = cmd.add_input(segment);
        }
        cmd = cmd
            .filter_complex(spec.concat_graph(segments.len()))
            .map("[outv]");
        if !spec.mute {
            cmd = cmd.map("[outa]");
        }
        let cmd = cmd.output_args(["-movflags", "+faststart"]);
        self.runner.run(&cmd).await
    }

    async fn add_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        spec: &SubtitleSpec,
        output: &Path,
    ) -> MediaResult<()> {
        let cmd = subtitle_command(video, subtitles, spec, output);
        self.runner.run(&cmd).await
    }

    async fn trim(&self, input: &Path, spec: &TrimSpec, output: &Path) -> MediaResult<()> {
        let cmd = trim_command(input, spec, output);
        self.runner.run(&cmd).await
    }
}
