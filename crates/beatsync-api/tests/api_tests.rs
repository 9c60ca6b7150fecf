//! HTTP-level tests against the real router.
//!
//! The processor and ffprobe are replaced by small shell scripts whose
//! behaviour is selected by markers in the uploaded bytes.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use beatsync_api::{create_router, ApiConfig, AppState};
use beatsync_media::{ProbeConfig, ProcessorConfig};
use beatsync_models::UploadPolicy;
use beatsync_storage::StorageConfig;

const BOUNDARY: &str = "beatsync-test-boundary";

/// Copies input to output unless a marker in the input asks otherwise.
const PROCESSOR_SCRIPT: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --input) in="$2"; shift 2 ;;
    --output) out="$2"; shift 2 ;;
    --min-size) min="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ "$min" = "999999" ]; then
  echo "min_size must be smaller than the frame" >&2
  exit 2
fi
if grep -q SLOW "$in"; then
  sleep 30
fi
if grep -q PARTIAL "$in"; then
  printf half > "$out"
  echo "encoder crashed" >&2
  exit 1
fi
if grep -q NOOUT "$in"; then
  exit 0
fi
cp "$in" "$out"
"#;

/// Reports 150.5 seconds for inputs marked LONG, 12 seconds otherwise.
const PROBE_SCRIPT: &str = r#"#!/bin/sh
for arg; do path="$arg"; done
if grep -q LONG "$path"; then
  echo '{"format":{"duration":"150.5"}}'
else
  echo '{"format":{"duration":"12.0"}}'
fi
"#;

struct TestApp {
    _dir: TempDir,
    router: Router,
    upload_dir: PathBuf,
    processed_dir: PathBuf,
}

impl TestApp {
    fn new() -> Self {
        Self::with(|_| {})
    }

    fn with(customize: impl FnOnce(&mut ApiConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let processor_script = dir.path().join("processor.sh");
        let probe_script = dir.path().join("probe.sh");
        std::fs::write(&processor_script, PROCESSOR_SCRIPT).unwrap();
        std::fs::write(&probe_script, PROBE_SCRIPT).unwrap();

        let mut config = ApiConfig {
            upload: UploadPolicy::default(),
            storage: StorageConfig {
                upload_dir: dir.path().join("uploads"),
                processed_dir: dir.path().join("processed"),
            },
            processor: ProcessorConfig {
                program: "sh".to_string(),
                script: Some(processor_script),
                working_dir: dir.path().to_path_buf(),
                timeout: Duration::from_secs(20),
                log_level: "INFO".to_string(),
            },
            probe: ProbeConfig {
                program: "sh".to_string(),
                script: Some(probe_script),
                timeout: Duration::from_secs(10),
            },
            ..ApiConfig::default()
        };
        customize(&mut config);

        let state = AppState::new(config).unwrap();
        let upload_dir = dir.path().join("uploads");
        let processed_dir = dir.path().join("processed");

        Self {
            router: create_router(state, None),
            _dir: dir,
            upload_dir,
            processed_dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn submit(&self, filename: &str, content: &[u8], fields: &[(&str, &str)]) -> (StatusCode, Value) {
        let response = self.send(upload_request(Some((filename, content)), fields)).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let status = response.status();
        (status, json_body(response).await)
    }
}

fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Request<Body> {
    let body = multipart_body(file, fields);
    Request::builder()
        .method("POST")
        .uri("/api/process-video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();

    let response = app.get("/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["message"], "BeatSync Video API is running");
}

#[tokio::test]
async fn test_ready_reflects_processor_installation() {
    let app = TestApp::new();
    let response = app.get("/api/ready").await;
    assert_eq!(response.status(), StatusCode::OK);

    let broken = TestApp::with(|config| {
        config.processor.script = Some(PathBuf::from("missing.py"));
    });
    let response = broken.get("/api/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(response).await;
    assert_eq!(body["checks"]["processor"]["status"], "error");
    assert_eq!(body["checks"]["storage"]["status"], "ok");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_ready_treats_missing_ffprobe_as_informational() {
    let app = TestApp::with(|config| {
        config.probe.program = "no-such-ffprobe-binary".to_string();
    });

    let response = app.get("/api/ready").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["processor"]["status"], "ok");
    assert_eq!(body["checks"]["ffprobe"]["status"], "error");
}

#[tokio::test]
async fn test_submit_download_cleanup_lifecycle() {
    let app = TestApp::new();
    let content = b"fake video bytes";

    let (status, body) = app
        .submit("My Clip.MP4", content, &[("pts_per_beat", "25"), ("ambient_rate", "2.5")])
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Video processed successfully");

    let id = body["videoId"].as_str().unwrap().to_string();
    assert_eq!(entries(&app.upload_dir), 0);
    assert_eq!(entries(&app.processed_dir), 1);

    let response = app.get(&format!("/api/download/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"beatsync_video_{id}.mp4\"").as_str()
    );
    assert_eq!(headers[header::CONTENT_LENGTH], content.len().to_string().as_str());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], content);

    let (status, body) = app.delete(&format!("/api/cleanup/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Video cleaned up successfully");

    let (status, body) = app.delete(&format!("/api/cleanup/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Video not found");

    let response = app.get(&format!("/api/download/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_unsupported_extension() {
    let app = TestApp::new();

    let (status, body) = app.submit("notes.txt", b"hello", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Invalid file type"));
    assert_eq!(entries(&app.upload_dir), 0);
}

#[tokio::test]
async fn test_rejects_missing_video_field() {
    let app = TestApp::new();

    let response = app.send(upload_request(None, &[("min_size", "10")])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "No video file provided");
}

#[tokio::test]
async fn test_rejects_non_multipart_request() {
    let app = TestApp::new();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/process-video")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_rejects_video_over_duration_limit() {
    let app = TestApp::new();

    let (status, body) = app.submit("long.mov", b"LONG video", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("too long"), "{error}");
    assert!(error.contains("2 minutes"), "{error}");
    assert_eq!(entries(&app.upload_dir), 0);
    assert_eq!(entries(&app.processed_dir), 0);
}

#[tokio::test]
async fn test_processor_diagnostic_is_surfaced() {
    let app = TestApp::new();

    let (status, body) = app
        .submit("clip.mp4", b"video", &[("min_size", "999999")])
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Video processing failed:"), "{error}");
    assert!(error.contains("min_size must be smaller than the frame"), "{error}");
    assert_eq!(entries(&app.upload_dir), 0);
    assert_eq!(entries(&app.processed_dir), 0);
}

#[tokio::test]
async fn test_partial_output_is_purged_on_failure() {
    let app = TestApp::new();

    let (status, body) = app.submit("clip.mkv", b"PARTIAL video", &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("encoder crashed"));
    assert_eq!(entries(&app.processed_dir), 0);
}

#[tokio::test]
async fn test_missing_output_is_reported() {
    let app = TestApp::new();

    let (status, body) = app.submit("clip.avi", b"NOOUT video", &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "Processing completed but output file was not created"
    );
}

#[tokio::test]
async fn test_processing_timeout() {
    let app = TestApp::with(|config| {
        config.processor.timeout = Duration::from_secs(1);
    });

    let start = Instant::now();
    let (status, body) = app.submit("clip.mp4", b"SLOW video", &[]).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(
        body["error"],
        "Processing timeout. Video might be too complex or long."
    );
    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(entries(&app.upload_dir), 0);
    assert_eq!(entries(&app.processed_dir), 0);
}

#[tokio::test]
async fn test_rejects_malformed_parameter() {
    let app = TestApp::new();

    let (status, body) = app
        .submit("clip.mp4", b"video", &[("ambient_rate", "fast")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ambient_rate"));
    assert_eq!(entries(&app.upload_dir), 0);
}

#[tokio::test]
async fn test_rejects_oversized_upload() {
    let app = TestApp::with(|config| {
        config.upload.max_upload_bytes = 1024;
    });

    let (status, body) = app.submit("clip.mp4", &vec![b'x'; 4096], &[]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert_eq!(entries(&app.upload_dir), 0);
}

#[tokio::test]
async fn test_rejects_streamed_upload_over_body_limit() {
    let app = TestApp::with(|config| {
        config.upload.max_upload_bytes = 1024;
    });

    // Chunked transfer: no Content-Length, so only the body limit can stop it.
    let body = multipart_body(Some(("clip.mp4", &vec![b'x'; 64 * 1024])), &[]);
    let chunks: Vec<Result<Bytes, std::io::Error>> = body
        .chunks(1000)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    let request = Request::builder()
        .method("POST")
        .uri("/api/process-video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from_stream(futures_util::stream::iter(chunks)))
        .unwrap();
    assert!(request.headers().get(header::CONTENT_LENGTH).is_none());

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(entries(&app.upload_dir), 0);
    assert_eq!(entries(&app.processed_dir), 0);
}

#[tokio::test]
async fn test_unknown_or_malformed_ids_are_not_found() {
    let app = TestApp::new();

    let response = app.get("/api/download/not-a-job-id").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Video not found");

    let response = app
        .get("/api/download/550e8400-e29b-41d4-a716-446655440000")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (status, body) = app.delete("/api/cleanup/..%2F..%2Fetc%2Fpasswd").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_ids() {
    let app = TestApp::new();

    let (first, second) = tokio::join!(
        app.submit("a.mp4", b"first", &[]),
        app.submit("a.mp4", b"second", &[]),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_ne!(first.1["videoId"], second.1["videoId"]);
    assert_eq!(entries(&app.processed_dir), 2);
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = TestApp::new();

    let response = app.get("/api/health").await;
    let headers = response.headers();
    assert_eq!(headers["X-Content-Type-Options"], "nosniff");
    assert_eq!(headers["X-Frame-Options"], "DENY");
    assert!(headers.contains_key("X-Request-ID"));

    let response = app
        .send(
            Request::builder()
                .uri("/api/health")
                .header("X-Request-ID", "trace-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.headers()["X-Request-ID"], "trace-123");
}
