//! Router tests driven through `tower::ServiceExt::oneshot` with a fake toolkit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use ffbox_api::{create_router, ApiConfig, AppState};
use ffbox_media::{
    ConcatSpec, MediaResult, MediaToolkit, MixSpec, SubtitleSpec, TranscodeSpec, TrimSpec,
};
use ffbox_models::{AudioInfo, MediaInfo, MediaKind, VideoInfo};
use ffbox_storage::{ArtifactRegistry, StorageRoot};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const MP4_HEADER: &[u8] = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2";
const MP3_HEADER: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00frame data";
const BOUNDARY: &str = "ffbox-test-boundary";

struct FakeToolkit;

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, _input: &Path, kind: MediaKind) -> MediaResult<MediaInfo> {
        Ok(match kind {
            MediaKind::Video => MediaInfo::Video(VideoInfo {
                duration: 20.0,
                size: 100,
                format_name: "mov,mp4,m4a,3gp,3g2,mj2".into(),
                codec_name: "h264".into(),
                width: 1280,
                height: 720,
                frame_rate: 25.0,
                bit_rate: 1_000_000,
            }),
            MediaKind::Audio => MediaInfo::Audio(AudioInfo {
                duration: 30.0,
                size: 100,
                format_name: "mp3".into(),
                codec_name: "mp3".into(),
                sample_rate: 44100,
                channels: 2,
                bit_rate: 128_000,
                channel_layout: "stereo".into(),
            }),
        })
    }

    async fn extract_frame(&self, _input: &Path, _ts: f64, output: &Path) -> MediaResult<()> {
        tokio::fs::write(output, b"jpeg").await?;
        Ok(())
    }

    async fn transcode(&self, _input: &Path, _spec: &TranscodeSpec, output: &Path) -> MediaResult<()> {
        tokio::fs::write(output, b"converted").await?;
        Ok(())
    }

    async fn mix_audio(&self, _v: &Path, _m: &Path, _spec: &MixSpec, output: &Path) -> MediaResult<()> {
        tokio::fs::write(output, b"mixed").await?;
        Ok(())
    }

    async fn concat(&self, _inputs: &[PathBuf], _spec: &ConcatSpec, output: &Path) -> MediaResult<()> {
        tokio::fs::write(output, b"joined").await?;
        Ok(())
    }

    async fn add_subtitles(
        &self,
        _video: &Path,
        _subtitles: &Path,
        _spec: &SubtitleSpec,
        output: &Path,
    ) -> MediaResult<()> {
        tokio::fs::write(output, b"subtitled").await?;
        Ok(())
    }

    async fn trim(&self, _input: &Path, _spec: &TrimSpec, output: &Path) -> MediaResult<()> {
        tokio::fs::write(output, b"trimmed").await?;
        Ok(())
    }
}

struct TestApp {
    dir: TempDir,
    registry: Arc<ArtifactRegistry>,
    router: Router,
}

async fn app_with(configure: impl FnOnce(&mut ApiConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ApiConfig::default();
    config.media.temp_dir = dir.path().to_path_buf();
    configure(&mut config);

    let root = StorageRoot::open(dir.path()).await.unwrap();
    let registry = Arc::new(ArtifactRegistry::new(root));
    let state = AppState::with_toolkit(config, Arc::clone(&registry), Arc::new(FakeToolkit)).unwrap();

    TestApp {
        dir,
        registry,
        router: create_router(state, None),
    }
}

async fn app() -> TestApp {
    app_with(|_| {}).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn files_on_disk(&self) -> Vec<String> {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect()
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_envelope() {
    let app = app().await;
    let (status, body) = app.send_json(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["msg"], "Service is healthy");
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["artifacts"], 0);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = app().await;
    let (status, body) = app.send_json(get("/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"code": 404, "msg": "Endpoint not found"}));
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = app_with(|c| c.api_keys = vec!["secret".into()]).await;

    let (status, body) = app.send_json(post_json("/info", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"code": 401, "msg": "API key required"}));

    let mut request = post_json("/info", json!({}));
    request
        .headers_mut()
        .insert("X-API-Key", "wrong".parse().unwrap());
    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["msg"], "Invalid API key");

    // Valid key reaches the handler, which then wants an input
    let mut request = post_json("/info", json!({}));
    request
        .headers_mut()
        .insert("X-API-Key", "secret".parse().unwrap());
    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "No media_url or file provided");

    // Health stays public
    let (status, _) = app.send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_process_without_input() {
    let app = app().await;
    let (status, body) = app
        .send_json(post_json("/process", json!({"take_screenshots": true})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["msg"], "No media_url or file provided");
}

#[tokio::test]
async fn test_process_rejects_bad_options_before_download() {
    let app = app().await;
    let (status, body) = app
        .send_json(post_json(
            "/process",
            json!({"media_url": "http://127.0.0.1:9/never.mp4", "convert_quality": "ultra"}),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().contains("ultra"));
}

#[tokio::test]
async fn test_process_rejects_non_http_url() {
    let app = app().await;
    let (status, body) = app
        .send_json(post_json("/process", json!({"media_url": "file:///etc/passwd"})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(app.files_on_disk().is_empty());
}

#[tokio::test]
async fn test_process_audio_upload_warns_about_screenshots() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart(
            "/process",
            &[
                Part::File("file", "song.mp3", MP3_HEADER),
                Part::Text("take_screenshots", "true"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Media processing completed successfully");
    assert_eq!(body["data"]["media_type"], "audio");
    assert_eq!(body["data"]["info"]["sample_rate"], 44100);
    assert_eq!(
        body["data"]["warnings"],
        json!(["Screenshots not supported for audio files"])
    );
    // Input removed, nothing produced
    assert!(app.files_on_disk().is_empty());
}

#[tokio::test]
async fn test_unsupported_output_format_for_audio() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart(
            "/process",
            &[
                Part::File("file", "song.mp3", MP3_HEADER),
                Part::Text("convert_format", "mkv"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().starts_with("Unsupported format 'mkv' for audio"));
    assert!(app.files_on_disk().is_empty());
}

#[tokio::test]
async fn test_process_video_then_download_with_auto_delete() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart(
            "/process",
            &[
                Part::Text("take_screenshots", "yes"),
                Part::Text("screenshot_count", "2"),
                Part::File("file", "clip.mp4", MP4_HEADER),
                Part::Text("convert_format", "webm"),
                Part::Text("convert_resolution", "480"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let data = &body["data"];
    assert_eq!(data["media_type"], "video");
    assert_eq!(data["info"]["width"], 1280);
    let shots = data["screenshots"].as_array().unwrap();
    assert_eq!(shots.len(), 2);
    assert_eq!(shots[0]["timestamp"], 5.0);
    assert_eq!(shots[1]["timestamp"], 15.0);
    assert_eq!(data["conversion"]["format"], "webm");
    assert_eq!(data["conversion"]["resolution"], "480");
    assert_eq!(app.registry.len().await, 3);

    let filename = data["conversion"]["filename"].as_str().unwrap().to_string();
    let url = data["conversion"]["url"].as_str().unwrap();
    assert_eq!(url, format!("/download/{}", filename));

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("{}?auto_delete=true", url)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/webm");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}\"", filename).as_str()
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"converted");

    // Deletion runs in the background once the body is dropped
    let mut deleted = false;
    for _ in 0..50 {
        if app.registry.lookup(&filename).await.is_err() {
            deleted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(deleted, "artifact still registered after auto_delete download");
    assert!(!app.dir.path().join(&filename).exists());
    assert_eq!(app.registry.len().await, 2);

    let (status, body) = app.send_json(get(url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "File not found");
}

#[tokio::test]
async fn test_download_keeps_file_without_auto_delete() {
    let app = app().await;
    let (_, body) = app
        .send_json(multipart(
            "/process",
            &[
                Part::File("file", "clip.mp4", MP4_HEADER),
                Part::Text("extract_info", "false"),
                Part::Text("convert_format", "mp4"),
            ],
        ))
        .await;
    let url = body["data"]["conversion"]["url"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, bytes) = app.send(get(&url)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"converted");
    }
    assert_eq!(app.registry.len().await, 1);
}

#[tokio::test]
async fn test_download_rejects_bad_names() {
    let app = app().await;

    let (status, body) = app.send_json(get("/download/missing.mp4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "File not found");

    let (status, _) = app.send(get("/download/..%2F..%2Fetc%2Fpasswd")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bgm_mix() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart(
            "/bgm",
            &[
                Part::File("file", "clip.mp4", MP4_HEADER),
                Part::File("bgm", "song.mp3", MP3_HEADER),
                Part::Text("mode", "ducking"),
                Part::Text("bgm_gain", "0.4"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["msg"], "BGM mixed");
    assert_eq!(body["data"]["mode"], "ducking");
    assert_eq!(body["data"]["bgm_gain"], 0.4);
    let filename = body["data"]["output"]["filename"].as_str().unwrap();
    assert!(filename.starts_with("bgm_") && filename.ends_with(".mp4"));
    // Only the output remains
    assert_eq!(app.files_on_disk(), vec![filename.to_string()]);
}

#[tokio::test]
async fn test_bgm_requires_music() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart("/bgm", &[Part::File("file", "clip.mp4", MP4_HEADER)]))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Need bgm_url or bgm file");
}

#[tokio::test]
async fn test_concat_uploads() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart(
            "/concat",
            &[
                Part::File("files[]", "a.mp4", MP4_HEADER),
                Part::File("files[]", "b.mp4", MP4_HEADER),
                Part::Text("resolution", "720p"),
                Part::Text("mute", "true"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["msg"], "Concat success");
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(
        body["data"]["options"],
        json!({"resolution": "720p", "fps": null, "crf": 23, "preset": "veryfast", "mute": true})
    );
    assert!(body["data"]["output"]["filename"]
        .as_str()
        .unwrap()
        .starts_with("concat_"));
}

#[tokio::test]
async fn test_concat_needs_two_inputs() {
    let app = app().await;
    let (status, body) = app
        .send_json(post_json("/concat", json!({"urls": ["http://127.0.0.1:9/a.mp4"]})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Need at least 2 videos (files[] or urls[])");
}

const SRT: &[u8] = b"1\n00:00:00,000 --> 00:00:02,000\nHello there\n";

#[tokio::test]
async fn test_index_lists_endpoints() {
    let app = app().await;
    let (status, body) = app.send_json(get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["service"], "ffbox-api");
    let endpoints = body["data"]["endpoints"].as_array().unwrap();
    assert!(endpoints.contains(&json!("POST /subtitle")));
    assert!(endpoints.contains(&json!("POST /edit")));
}

#[tokio::test]
async fn test_soft_subtitle_upload() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart(
            "/subtitle",
            &[
                Part::File("file", "clip.mp4", MP4_HEADER),
                Part::File("subtitle", "clip.srt", SRT),
                Part::Text("mode", "soft"),
                Part::Text("language", "eng"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["msg"], "Subtitle applied");
    assert_eq!(body["data"]["mode"], "soft");
    assert_eq!(body["data"]["fonts_dir"], Value::Null);
    let filename = body["data"]["output"]["filename"].as_str().unwrap();
    assert!(filename.starts_with("sub_soft_") && filename.ends_with(".mp4"));
    assert_eq!(app.files_on_disk(), vec![filename.to_string()]);
}

#[tokio::test]
async fn test_subtitle_needs_track_and_known_format() {
    let app = app().await;
    let (status, body) = app
        .send_json(multipart(
            "/subtitle",
            &[Part::File("file", "clip.mp4", MP4_HEADER)],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Need subtitle_url or subtitle file");

    let (status, body) = app
        .send_json(multipart(
            "/subtitle",
            &[
                Part::File("file", "clip.mp4", MP4_HEADER),
                Part::File("subtitle", "clip.txt", SRT),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported subtitle format: txt"));
    assert!(app.files_on_disk().is_empty());
}

#[tokio::test]
async fn test_edit_plan_checked_before_download() {
    let app = app().await;
    // Port 9 is never contacted: the plan fails first
    let (status, body) = app
        .send_json(post_json(
            "/edit",
            json!({
                "inputs": ["http://127.0.0.1:9/a.mp4"],
                "operations": [{"type": "concat"}]
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Invalid request: concat requires inputs >= 2");

    let (status, body) = app
        .send_json(post_json(
            "/edit",
            json!({"inputs": ["http://127.0.0.1:9/a.mp4"], "operations": [{"type": "sharpen"}]}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Unknown operation: sharpen");
}

#[tokio::test]
async fn test_edit_returns_only_final_artifacts() {
    let app = app().await;
    let operations = json!([
        {"type": "concat", "resolution": "720p"},
        {"type": "trim", "start": 1, "duration": 5},
        {"type": "screenshot", "count": 1},
        {"type": "convert", "format": "webm", "quality": "low"}
    ])
    .to_string();
    let (status, body) = app
        .send_json(multipart(
            "/edit",
            &[
                Part::File("files[]", "a.mp4", MP4_HEADER),
                Part::File("files[]", "b.mp4", MP4_HEADER),
                Part::Text("operations", &operations),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["msg"], "Edit pipeline success");
    assert_eq!(
        body["data"]["steps"],
        json!(["concat", "trim", "screenshot", "convert"])
    );
    let output = body["data"]["output"]["filename"].as_str().unwrap().to_string();
    assert!(output.starts_with("converted_") && output.ends_with(".webm"));
    assert_eq!(body["data"]["conversion"]["format"], "webm");
    let screenshot = body["data"]["screenshots"][0]["filename"]
        .as_str()
        .unwrap()
        .to_string();

    let mut on_disk = app.files_on_disk();
    on_disk.sort();
    let mut expected = vec![output, screenshot];
    expected.sort();
    assert_eq!(on_disk, expected);
    assert_eq!(app.registry.len().await, 2);
}

/// A body streamed without a length, so the limit trips mid-upload.
fn chunked_multipart(uri: &str, files: usize, file_size: usize) -> Request<Body> {
    let mut body = Vec::new();
    for i in 0..files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files[]\"; filename=\"{}.mp4\"\r\n\
                 Content-Type: video/mp4\r\n\r\n",
                BOUNDARY, i
            )
            .as_bytes(),
        );
        body.extend_from_slice(MP4_HEADER);
        body.resize(body.len() + file_size - MP4_HEADER.len(), 0);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        body.chunks(64 * 1024).map(|c| Ok(c.to_vec())).collect();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from_stream(futures_util::stream::iter(chunks)))
        .unwrap()
}

#[tokio::test]
async fn test_body_cut_off_mid_upload_is_too_large() {
    let app = app_with(|c| c.media.max_file_size = 1 << 20).await;
    // Each file fits the per-file cap; together they exceed the body limit
    let (status, body) = app
        .send_json(chunked_multipart("/concat", 3, 900_000))
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{body}");
    assert_eq!(body["code"], 413);
    assert!(app.files_on_disk().is_empty());
    assert!(app.registry.is_empty().await);
}
