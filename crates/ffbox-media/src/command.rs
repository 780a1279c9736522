//! FFmpeg/FFprobe command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Histogram of external tool wall time, labelled by tool.
pub const TOOL_DURATION_HISTOGRAM: &str = "ffbox_tool_duration_seconds";

/// Verbosity passed to every ffmpeg invocation.
const FFMPEG_LOG_LEVEL: &str = "error";

#[derive(Debug, Clone)]
struct FfmpegInput {
    path: PathBuf,
    /// Options placed before this input's `-i`
    options: Vec<String>,
}

impl FfmpegInput {
    fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options: Vec::new(),
        }
    }
}

/// Argument list for one ffmpeg run: ordered inputs, output options, one output.
///
/// Always overwrites the output and never reads stdin.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput::new(input)],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Append another input. Later `input_arg` calls apply to it.
    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput::new(input));
        self
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(input) = self.inputs.last_mut() {
            input.options.push(arg.into());
        }
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn flag(self, name: &str, value: impl Into<String>) -> Self {
        self.output_arg(name).output_arg(value)
    }

    /// Input-side seek, accurate to the millisecond.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Output-side length limit.
    pub fn duration(self, seconds: f64) -> Self {
        self.flag("-t", format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.flag("-vf", filter)
    }

    pub fn filter_complex(self, graph: impl Into<String>) -> Self {
        self.flag("-filter_complex", graph)
    }

    /// `-map` a stream specifier or filter label.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.flag("-map", spec)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.flag("-c:v", codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.flag("-c:a", codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.flag("-crf", crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.flag("-preset", preset)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.flag("-b:a", bitrate)
    }

    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    pub fn single_frame(self) -> Self {
        self.flag("-frames:v", "1")
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-nostdin", "-v", FFMPEG_LOG_LEVEL]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Captured result of a finished external process.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr_tail: String,
}

/// Runner for FFmpeg and FFprobe with an optional kill timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any process still running after `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;
        let args = cmd.build_args();
        debug!(args = %args.join(" "), "Running ffmpeg");
        self.execute("ffmpeg", &args).await.map(|_| ())
    }

    /// Run ffprobe with the given arguments, returning its stdout.
    pub async fn probe(&self, args: &[String]) -> MediaResult<Vec<u8>> {
        check_ffprobe()?;
        debug!(args = %args.join(" "), "Running ffprobe");
        match self.execute("ffprobe", args).await {
            Ok(output) => Ok(output.stdout),
            Err(MediaError::FfmpegFailed {
                message, stderr, ..
            }) => Err(MediaError::probe_failed(message, stderr)),
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput> {
        let started = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout_handle = child.stdout.take().map(|mut stdout| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = tokio::io::AsyncReadExt::read_to_end(&mut stdout, &mut buf).await;
                buf
            })
        });
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(stderr_tail(stderr)));

        let status = self.wait_for_completion(program, &mut child).await;
        metrics::histogram!(TOOL_DURATION_HISTOGRAM, "tool" => program.to_string())
            .record(started.elapsed().as_secs_f64());

        let stdout = match stdout_handle {
            Some(h) => h.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr_tail = match stderr_handle {
            Some(h) => h.await.unwrap_or_default(),
            None => String::new(),
        };

        let status = status?;
        if status.success() {
            Ok(ToolOutput {
                stdout,
                stderr_tail,
            })
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("{} exited with status {}", program, status),
                Some(stderr_tail).filter(|s| !s.is_empty()),
                status.code(),
            ))
        }
    }

    /// Wait for the child, killing it if the timeout elapses.
    async fn wait_for_completion(
        &self,
        program: &str,
        child: &mut Child,
    ) -> MediaResult<std::process::ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(program, timeout_secs = timeout.as_secs(), "Killing external tool after timeout");
                let _ = child.kill().await;
                Err(MediaError::ProcessingFailed(format!(
                    "{} timed out after {} seconds",
                    program,
                    timeout.as_secs()
                )))
            }
        }
    }
}

/// Drain `reader` to EOF, keeping the last [`STDERR_TAIL_LINES`] lines.
///
/// Tools may print non-UTF-8 bytes (file names, metadata); those lines are
/// decoded lossily instead of ending the read, so the pipe never fills up.
async fn stderr_tail<R>(reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(e) => {
                debug!(error = %e, "Stopped reading tool stderr");
                break;
            }
        }
    }
    Vec::from(tail).join("\n")
}

/// Locate `ffmpeg` on PATH.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Locate `ffprobe` on PATH.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
