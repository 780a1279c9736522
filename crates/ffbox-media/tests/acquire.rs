//! Remote acquisition against a mock HTTP server.

use std::time::Duration;

use ffbox_media::{InputAcquirer, MediaConfig, MediaError, MediaSource};
use ffbox_models::MediaKind;
use ffbox_storage::StorageRoot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MP3_HEADER: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00rest of the frame";

async fn acquirer(config: MediaConfig) -> (tempfile::TempDir, InputAcquirer) {
    let dir = tempfile::tempdir().unwrap();
    let root = StorageRoot::open(dir.path()).await.unwrap();
    (dir, InputAcquirer::new(root, config).unwrap())
}

fn file_count(dir: &tempfile::TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

#[tokio::test]
async fn test_download_sniffs_and_keeps_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/song.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_HEADER))
        .mount(&server)
        .await;

    let (dir, acquirer) = acquirer(MediaConfig::default()).await;
    let local = acquirer
        .acquire(MediaSource::RemoteUrl(format!("{}/media/song.mp3", server.uri())))
        .await
        .unwrap();

    assert_eq!(local.kind(), MediaKind::Audio);
    assert_eq!(local.size(), MP3_HEADER.len() as u64);
    assert_eq!(local.extension(), Some("mp3"));
    let name = local.path().file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("input_") && name.ends_with(".mp3"));

    drop(local);
    assert_eq!(file_count(&dir), 0);
}

#[tokio::test]
async fn test_http_error_status_is_download_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (dir, acquirer) = acquirer(MediaConfig::default()).await;
    let err = acquirer
        .acquire_url(&format!("{}/missing.mp4", server.uri()))
        .await
        .unwrap_err();

    match err {
        MediaError::DownloadFailed { message } => assert!(message.contains("404")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(file_count(&dir), 0);
}

#[tokio::test]
async fn test_oversized_download_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let config = MediaConfig {
        max_file_size: 1024,
        ..MediaConfig::default()
    };
    let (dir, acquirer) = acquirer(config).await;
    let err = acquirer
        .acquire_url(&format!("{}/big.mp4", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::FileTooLarge { limit: 1024 }));
    assert_eq!(file_count(&dir), 0);
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(MP3_HEADER)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = MediaConfig {
        download_timeout: Duration::from_millis(200),
        ..MediaConfig::default()
    };
    let (dir, acquirer) = acquirer(config).await;
    let err = acquirer
        .acquire_url(&format!("{}/slow.mp3", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::DownloadTimeout(_)));
    assert_eq!(file_count(&dir), 0);
}

#[tokio::test]
async fn test_unrecognized_body_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not media</html>"))
        .mount(&server)
        .await;

    let (dir, acquirer) = acquirer(MediaConfig::default()).await;
    let err = acquirer
        .acquire_url(&format!("{}/page", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::UnsupportedFormat(_)));
    assert_eq!(file_count(&dir), 0);
}
