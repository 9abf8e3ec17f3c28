//! HTTP surface tests driven through the router with `oneshot`

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use polyp_core::config::ServerConfig;
use polyp_eye::{EndoscopeDevice, Examination, NullDetector};
use polyp_server::{create_router, AppState};
use polyp_storage::create_memory_pool;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    app: Router,
    state: AppState,
    _examples: TempDir,
    uploads: TempDir,
}

fn write_sequence(dir: &Path, frames: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..frames {
        image::RgbImage::from_pixel(16, 12, image::Rgb([40, 80, 120]))
            .save(dir.join(format!("{}.png", i)))
            .unwrap();
    }
}

fn harness() -> Harness {
    let examples = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    write_sequence(&examples.path().join("clip"), 3);
    std::fs::write(examples.path().join("broken.mp4"), b"not a video").unwrap();

    let config = ServerConfig {
        examples_dir: examples.path().to_path_buf(),
        upload_dir: uploads.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let examination = Examination::new(Arc::new(NullDetector), EndoscopeDevice::default());
    let state = AppState::new(examination, &config);
    Harness {
        app: create_router(state.clone()),
        state,
        _examples: examples,
        uploads,
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_until_idle(app: &Router) -> Value {
    for _ in 0..200 {
        let (_, state) = send_json(app, Method::GET, "/api/state", None).await;
        if state["feed"]["running"] == json!(false) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("feed did not finish");
}

#[tokio::test]
async fn test_index_serves_ui() {
    let h = harness();
    let (status, body) = send(&h.app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Feed to Endoscope"));
    assert!(html.contains("Bounding Boxes"));
    assert!(html.contains("Segmentation masks"));
}

#[tokio::test]
async fn test_health_without_and_with_database() {
    let h = harness();
    let (status, body) = send_json(&h.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "disabled");

    let pool = create_memory_pool().await.unwrap();
    let app = create_router(h.state.clone().with_database(pool));
    let (status, body) = send_json(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_initial_state() {
    let h = harness();
    let (status, state) = send_json(&h.app, Method::GET, "/api/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["detection_enabled"], true);
    assert_eq!(state["segmentation_enabled"], true);
    assert_eq!(state["paused"], false);
    assert_eq!(state["feed"]["running"], false);
    assert_eq!(state["model"]["name"], "none");
}

#[tokio::test]
async fn test_toggles_round_trip_through_state() {
    let h = harness();
    let (status, snapshot) = send_json(
        &h.app,
        Method::POST,
        "/api/detection",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["detection_enabled"], false);

    send_json(&h.app, Method::POST, "/api/segmentation", Some(json!({ "enabled": false }))).await;
    let (_, paused) = send_json(&h.app, Method::POST, "/api/pause", None).await;
    assert_eq!(paused["paused"], true);
    let (_, toggled) = send_json(&h.app, Method::POST, "/api/toggle-pause", None).await;
    assert_eq!(toggled["paused"], false);
    send_json(&h.app, Method::POST, "/api/toggle-pause", None).await;
    let (_, resumed) = send_json(&h.app, Method::POST, "/api/resume", None).await;
    assert_eq!(resumed["paused"], false);

    let snapshot = h.state.examination.snapshot();
    assert!(!snapshot.detection_enabled);
    assert!(!snapshot.segmentation_enabled);
    assert!(!snapshot.paused);
}

#[tokio::test]
async fn test_malformed_toggle_is_json_error() {
    let h = harness();
    let (status, body) = send_json(
        &h.app,
        Method::POST,
        "/api/detection",
        Some(json!({ "on": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_list_and_upload_videos() {
    let h = harness();
    let (_, videos) = send_json(&h.app, Method::GET, "/api/videos", None).await;
    let names: Vec<&str> = videos
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["broken.mp4", "clip"]);

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/videos/my%20case.mp4")
        .body(Body::from(vec![0u8; 64]))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["name"], "my_case.mp4");
    assert!(h.uploads.path().join("my_case.mp4").is_file());

    let (_, videos) = send_json(&h.app, Method::GET, "/api/videos", None).await;
    assert_eq!(videos[0]["name"], "my_case.mp4");
    assert_eq!(videos[0]["origin"], "upload");
}

#[tokio::test]
async fn test_upload_rejects_unsupported_names() {
    let h = harness();
    for uri in ["/api/videos/notes.txt", "/api/videos/..mp4"] {
        let request = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .body(Body::from("data"))
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_feed_unknown_video_is_404() {
    let h = harness();
    let (status, body) = send_json(
        &h.app,
        Method::POST,
        "/api/feed",
        Some(json!({ "video": "missing.mp4" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_frame_before_any_feed_is_404() {
    let h = harness();
    let (status, _) = send(&h.app, Method::GET, "/api/frame.jpg", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feed_image_sequence_to_completion() {
    let h = harness();
    let (status, body) = send_json(
        &h.app,
        Method::POST,
        "/api/feed",
        Some(json!({ "video": "clip" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["video"], "clip");

    let state = wait_until_idle(&h.app).await;
    assert_eq!(state["feed"]["frames_emitted"], 3);
    assert!(state["feed"]["error"].is_null());

    let request = Request::builder()
        .uri("/api/frame.jpg")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let jpeg = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_stream_has_multipart_content_type() {
    let h = harness();
    let request = Request::builder()
        .uri("/api/stream.mjpg")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert_eq!(content_type, "multipart/x-mixed-replace; boundary=frame");

    h.state.feed.close();
    let (status, _) = send(&h.app, Method::GET, "/api/stream.mjpg", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
