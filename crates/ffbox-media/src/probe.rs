//! FFprobe media information.

use std::path::Path;

use ffbox_models::{AudioInfo, MediaInfo, MediaKind, VideoInfo};
use serde::Deserialize;

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
}

/// Probe a file and normalize the result for the detected kind.
pub async fn probe_media(
    runner: &FfmpegRunner,
    path: impl AsRef<Path>,
    kind: MediaKind,
) -> MediaResult<MediaInfo> {
    let path = path.as_ref();
    let args = vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ];
    let stdout = runner.probe(&args).await?;
    parse_probe_output(&stdout, kind)
}

/// Parse ffprobe JSON into [`MediaInfo`].
///
/// Uses the first stream of the requested kind. Missing numeric fields become 0.
pub fn parse_probe_output(json: &[u8], kind: MediaKind) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| MediaError::probe_failed(format!("unparsable output: {}", e), None))?;

    let codec_type = kind.as_str();
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some(codec_type))
        .ok_or_else(|| MediaError::probe_failed(format!("No {} stream found", codec_type), None))?;

    let format = &probe.format;
    let duration = parse_num::<f64>(format.duration.as_deref()).unwrap_or(0.0);
    let size = parse_num::<u64>(format.size.as_deref()).unwrap_or(0);
    let bit_rate = parse_num::<u64>(format.bit_rate.as_deref()).unwrap_or(0);
    let format_name = format.format_name.clone().unwrap_or_default();
    let codec_name = stream.codec_name.clone().unwrap_or_default();

    Ok(match kind {
        MediaKind::Video => MediaInfo::Video(VideoInfo {
            duration,
            size,
            format_name,
            codec_name,
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            frame_rate: stream
                .r_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .unwrap_or(0.0),
            bit_rate,
        }),
        MediaKind::Audio => MediaInfo::Audio(AudioInfo {
            duration,
            size,
            format_name,
            codec_name,
            sample_rate: parse_num::<u32>(stream.sample_rate.as_deref()).unwrap_or(0),
            channels: stream.channels.unwrap_or(0),
            bit_rate,
            channel_layout: stream.channel_layout.clone().unwrap_or_default(),
        }),
    })
}

fn parse_num<T: std::str::FromStr>(s: Option<&str>) -> Option<T> {
    s.and_then(|v| v.trim().parse().ok())
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). A zero denominator yields 0.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return Some(if den > 0.0 { num / den } else { 0.0 });
    }
    s.parse().ok()
}
