//! Input acquisition.
//!
//! Turns a remote URL or an uploaded byte stream into a [`LocalMediaFile`]
//! under the storage root, enforcing the size cap while bytes arrive and
//! classifying the content as video or audio.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use ffbox_models::MediaKind;
use ffbox_storage::StorageRoot;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt};
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::sniff::{sniff_media_kind, SNIFF_LEN};

/// Counter of acquired inputs, labelled by source.
pub const INPUTS_ACQUIRED_COUNTER: &str = "ffbox_inputs_acquired_total";

/// Longest extension carried over into the local filename.
const MAX_EXTENSION_LEN: usize = 8;

/// Subtitle formats FFmpeg can both burn in and mux as a text track.
pub const SUBTITLE_FORMATS: &[&str] = &["srt", "ass", "ssa", "vtt"];

/// An uploaded file as handed over by the HTTP layer.
pub struct UploadSource<'a> {
    pub filename: Option<String>,
    /// Size claimed by the client; a hint only
    pub declared_size: Option<u64>,
    pub stream: BoxStream<'a, io::Result<Bytes>>,
}

/// Where an input comes from.
pub enum MediaSource<'a> {
    RemoteUrl(String),
    Upload(UploadSource<'a>),
}

/// A downloaded or uploaded input owned by a single request.
///
/// The file is removed when this value is dropped.
#[derive(Debug)]
pub struct LocalMediaFile {
    path: TempPath,
    size: u64,
    kind: MediaKind,
    extension: Option<String>,
}

impl LocalMediaFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Adopt an existing file (tests and tools).
    pub fn from_existing(path: impl Into<PathBuf>, kind: MediaKind, size: u64) -> Self {
        let path: PathBuf = path.into();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        Self {
            path: TempPath::from_path(path),
            size,
            kind,
            extension,
        }
    }
}

/// A subtitle track owned by a single request, removed on drop.
#[derive(Debug)]
pub struct LocalSubtitleFile {
    path: TempPath,
    size: u64,
    format: String,
}

impl LocalSubtitleFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Lowercase extension, one of [`SUBTITLE_FORMATS`].
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Adopt an existing file (tests and tools).
    pub fn from_existing(path: impl Into<PathBuf>, format: impl Into<String>, size: u64) -> Self {
        Self {
            path: TempPath::from_path(path.into()),
            size,
            format: format.into(),
        }
    }
}

/// Upload stream error meaning the request body hit its size limit.
///
/// The HTTP layer wraps it in an `io::Error` so the acquirer can report
/// `FileTooLarge` instead of a broken upload.
#[derive(Debug, Error)]
#[error("request body exceeded its size limit")]
pub struct BodyLimitExceeded;

/// Bytes on their way into the storage root.
struct Incoming<'a> {
    extension: Option<String>,
    stream: BoxStream<'a, MediaResult<Bytes>>,
    /// Metrics label
    source: &'static str,
}

/// Fetches inputs into the storage root.
#[derive(Clone)]
pub struct InputAcquirer {
    root: StorageRoot,
    config: MediaConfig,
    http: reqwest::Client,
}

impl InputAcquirer {
    pub fn new(root: StorageRoot, config: MediaConfig) -> MediaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .user_agent(concat!("ffbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MediaError::download_failed(format!("HTTP client setup: {}", e)))?;
        Ok(Self { root, config, http })
    }

    pub async fn acquire(&self, source: MediaSource<'_>) -> MediaResult<LocalMediaFile> {
        let incoming = self.open(source).await?;
        self.store_media(incoming).await
    }

    /// Download a remote file.
    pub async fn acquire_url(&self, raw_url: &str) -> MediaResult<LocalMediaFile> {
        let incoming = self.open_url(raw_url).await?;
        self.store_media(incoming).await
    }

    /// Persist an uploaded stream.
    pub async fn acquire_upload(&self, upload: UploadSource<'_>) -> MediaResult<LocalMediaFile> {
        let incoming = self.open_upload(upload)?;
        self.store_media(incoming).await
    }

    /// Fetch a subtitle track. The extension decides the format; no media
    /// sniffing applies.
    pub async fn acquire_subtitles(&self, source: MediaSource<'_>) -> MediaResult<LocalSubtitleFile> {
        let incoming = self.open(source).await?;
        let format = incoming
            .extension
            .clone()
            .filter(|e| SUBTITLE_FORMATS.contains(&e.as_str()))
            .ok_or_else(|| {
                MediaError::UnsupportedSubtitleFormat(
                    incoming
                        .extension
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                )
            })?;

        let path = self
            .root
            .path()
            .join(StorageRoot::unique_name("input", &format!(".{}", format)));
        let temp_path = TempPath::from_path(&path);
        let (size, _) = write_capped(incoming.stream, &path, self.config.max_file_size).await?;
        if size == 0 {
            return Err(MediaError::invalid_request("Subtitle file is empty"));
        }

        metrics::counter!(INPUTS_ACQUIRED_COUNTER, "source" => incoming.source).increment(1);
        info!(path = %path.display(), size, format = %format, "Subtitles acquired");
        Ok(LocalSubtitleFile {
            path: temp_path,
            size,
            format,
        })
    }

    async fn open<'a>(&self, source: MediaSource<'a>) -> MediaResult<Incoming<'a>> {
        match source {
            MediaSource::RemoteUrl(url) => self.open_url(&url).await,
            MediaSource::Upload(upload) => self.open_upload(upload),
        }
    }

    async fn open_url(&self, raw_url: &str) -> MediaResult<Incoming<'static>> {
        let url = Url::parse(raw_url.trim()).map_err(|_| MediaError::InvalidUrl(raw_url.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(MediaError::InvalidUrl(raw_url.to_string()));
        }

        info!(url = %url, "Downloading media");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| http_error(e, self.config.download_timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!("HTTP {}", status)));
        }
        if let Some(length) = response.content_length() {
            if length > self.config.max_file_size {
                warn!(length, limit = self.config.max_file_size, "Remote file too large");
                return Err(MediaError::FileTooLarge {
                    limit: self.config.max_file_size,
                });
            }
        }

        let extension = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(extension_of);

        let timeout = self.config.download_timeout;
        let stream = response
            .bytes_stream()
            .map_err(move |e| http_error(e, timeout))
            .boxed();
        Ok(Incoming {
            extension,
            stream,
            source: "url",
        })
    }

    fn open_upload<'a>(&self, upload: UploadSource<'a>) -> MediaResult<Incoming<'a>> {
        let limit = self.config.max_file_size;
        if upload.declared_size.is_some_and(|declared| declared > limit) {
            return Err(MediaError::FileTooLarge { limit });
        }

        let extension = upload.filename.as_deref().and_then(extension_of);
        debug!(filename = ?upload.filename, "Receiving upload");

        let stream = upload
            .stream
            .map_err(move |e| {
                if e.get_ref().is_some_and(|inner| inner.is::<BodyLimitExceeded>()) {
                    MediaError::FileTooLarge { limit }
                } else {
                    MediaError::invalid_request(format!("Failed to read upload: {}", e))
                }
            })
            .boxed();
        Ok(Incoming {
            extension,
            stream,
            source: "upload",
        })
    }

    /// Stream bytes to `input_<uuid>[.ext]`, enforcing the cap, then classify.
    async fn store_media(&self, incoming: Incoming<'_>) -> MediaResult<LocalMediaFile> {
        let Incoming {
            extension,
            stream,
            source,
        } = incoming;
        let suffix = extension
            .as_ref()
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let path = self
            .root
            .path()
            .join(StorageRoot::unique_name("input", &suffix));
        // Removed on any early return below
        let temp_path = TempPath::from_path(&path);

        let (size, header) = write_capped(stream, &path, self.config.max_file_size).await?;

        let kind = sniff_media_kind(&header)
            .or_else(|| {
                extension
                    .as_deref()
                    .and_then(|e| self.config.kind_for_extension(e))
            })
            .ok_or_else(|| {
                MediaError::UnsupportedFormat(
                    extension
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                )
            })?;

        metrics::counter!(INPUTS_ACQUIRED_COUNTER, "source" => source).increment(1);
        info!(
            path = %path.display(),
            size,
            kind = %kind,
            "Input acquired"
        );
        Ok(LocalMediaFile {
            path: temp_path,
            size,
            kind,
            extension,
        })
    }
}

fn http_error(err: reqwest::Error, timeout: Duration) -> MediaError {
    if err.is_timeout() {
        MediaError::DownloadTimeout(timeout.as_secs())
    } else {
        MediaError::download_failed(err.to_string())
    }
}

/// Copy a byte stream to `path`, failing with `FileTooLarge` once `limit` is passed.
///
/// Returns the byte count and the first [`SNIFF_LEN`] bytes. The caller owns
/// removal of the partial file.
async fn write_capped<S>(stream: S, path: &Path, limit: u64) -> MediaResult<(u64, Vec<u8>)>
where
    S: Stream<Item = MediaResult<Bytes>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    let mut header = Vec::with_capacity(SNIFF_LEN);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > limit {
            warn!(written, limit, "Input exceeded size limit, aborting");
            return Err(MediaError::FileTooLarge { limit });
        }
        if header.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - header.len()).min(chunk.len());
            header.extend_from_slice(&chunk[..take]);
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((written, header))
}

/// Lowercased, filename-safe extension of a path-like string.
fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    (!ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    .then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: Vec<&'static [u8]>) -> BoxStream<'static, io::Result<Bytes>> {
        futures_util::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p)))).boxed()
    }

    async fn acquirer(limit: u64) -> (tempfile::TempDir, InputAcquirer) {
        let dir = tempfile::tempdir().unwrap();
        let root = StorageRoot::open(dir.path()).await.unwrap();
        let config = MediaConfig {
            max_file_size: limit,
            ..MediaConfig::default()
        };
        (dir, InputAcquirer::new(root, config).unwrap())
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Clip.MP4").as_deref(), Some("mp4"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("weird.m p4"), None);
    }

    #[tokio::test]
    async fn test_upload_sniffs_content_over_extension() {
        let (dir, acquirer) = acquirer(1024).await;
        let upload = UploadSource {
            filename: Some("song.mp4".into()),
            declared_size: None,
            stream: chunks(vec![b"ID3\x04\x00", b"rest of the frames"]),
        };

        let local = acquirer.acquire_upload(upload).await.unwrap();
        assert_eq!(local.kind(), MediaKind::Audio);
        assert_eq!(local.size(), 23);
        assert_eq!(local.extension(), Some("mp4"));
        assert!(local
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("input_"));

        let path = local.path().to_path_buf();
        assert!(path.exists());
        drop(local);
        assert!(!path.exists());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_upload_falls_back_to_extension() {
        let (_dir, acquirer) = acquirer(1024).await;
        let upload = UploadSource {
            filename: Some("clip.wmv".into()),
            declared_size: Some(4),
            stream: chunks(vec![b"\x30\x26\xB2\x75"]),
        };
        let local = acquirer.acquire_upload(upload).await.unwrap();
        assert_eq!(local.kind(), MediaKind::Video);
    }

    #[tokio::test]
    async fn test_upload_unknown_content_rejected() {
        let (dir, acquirer) = acquirer(1024).await;
        let upload = UploadSource {
            filename: Some("notes.txt".into()),
            declared_size: None,
            stream: chunks(vec![b"just some text"]),
        };
        let err = acquirer.acquire_upload(upload).await.unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedFormat(_)));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_upload_cap_enforced_mid_stream() {
        let (dir, acquirer) = acquirer(8).await;
        let upload = UploadSource {
            filename: Some("a.mp3".into()),
            // Client lies about the size
            declared_size: Some(4),
            stream: chunks(vec![b"ID3\x04\x00", b"\x00\x00\x00\x00\x00"]),
        };
        let err = acquirer.acquire_upload(upload).await.unwrap_err();
        assert!(matches!(err, MediaError::FileTooLarge { limit: 8 }));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_upload_exactly_at_cap_accepted() {
        let (_dir, acquirer) = acquirer(8).await;
        let upload = UploadSource {
            filename: Some("a.mp3".into()),
            declared_size: None,
            stream: chunks(vec![b"ID3\x04", b"\x00\x00\x00\x00"]),
        };
        assert_eq!(acquirer.acquire_upload(upload).await.unwrap().size(), 8);
    }

    #[tokio::test]
    async fn test_body_limit_mid_upload_is_too_large() {
        let (dir, acquirer) = acquirer(1024).await;
        let stream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"ID3\x04\x00")),
            Err(io::Error::other(BodyLimitExceeded)),
        ])
        .boxed();
        let upload = UploadSource {
            filename: Some("a.mp3".into()),
            declared_size: None,
            stream,
        };

        let err = acquirer.acquire_upload(upload).await.unwrap_err();
        assert!(matches!(err, MediaError::FileTooLarge { limit: 1024 }));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_broken_upload_is_client_error() {
        let (_dir, acquirer) = acquirer(1024).await;
        let stream = futures_util::stream::iter(vec![Err(io::Error::other("connection reset"))]).boxed();
        let upload = UploadSource {
            filename: Some("a.mp3".into()),
            declared_size: None,
            stream,
        };
        let err = acquirer.acquire_upload(upload).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidRequest(ref m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_subtitle_upload_skips_sniffing() {
        let (dir, acquirer) = acquirer(1024).await;
        let upload = UploadSource {
            filename: Some("Episode.SRT".into()),
            declared_size: None,
            stream: chunks(vec![b"1\n00:00:01,000 --> 00:00:02,000\nHello\n"]),
        };

        let subs = acquirer
            .acquire_subtitles(MediaSource::Upload(upload))
            .await
            .unwrap();
        assert_eq!(subs.format(), "srt");
        assert_eq!(subs.size(), 38);
        let name = subs.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("input_") && name.ends_with(".srt"), "{name}");

        drop(subs);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_subtitle_format_allow_list() {
        let (dir, acquirer) = acquirer(1024).await;
        for filename in [Some("notes.txt"), Some("clip.mp4"), None] {
            let upload = UploadSource {
                filename: filename.map(str::to_string),
                declared_size: None,
                stream: chunks(vec![b"WEBVTT\n"]),
            };
            let err = acquirer
                .acquire_subtitles(MediaSource::Upload(upload))
                .await
                .unwrap_err();
            assert!(matches!(err, MediaError::UnsupportedSubtitleFormat(_)), "{filename:?}");
        }
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_empty_subtitle_rejected() {
        let (dir, acquirer) = acquirer(1024).await;
        let upload = UploadSource {
            filename: Some("empty.vtt".into()),
            declared_size: None,
            stream: chunks(vec![]),
        };
        assert!(matches!(
            acquirer.acquire_subtitles(MediaSource::Upload(upload)).await,
            Err(MediaError::InvalidRequest(_))
        ));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_declared_size_rejected_early() {
        let (_dir, acquirer) = acquirer(8).await;
        let upload = UploadSource {
            filename: Some("a.mp3".into()),
            declared_size: Some(9),
            stream: chunks(vec![]),
        };
        assert!(matches!(
            acquirer.acquire_upload(upload).await,
            Err(MediaError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_urls() {
        let (_dir, acquirer) = acquirer(8).await;
        for url in ["not a url", "ftp://example.com/a.mp4", "file:///etc/passwd"] {
            assert!(matches!(
                acquirer.acquire_url(url).await,
                Err(MediaError::InvalidUrl(_))
            ));
        }
    }
}
