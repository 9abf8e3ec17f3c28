// HTTP routes for the examination UI

use crate::error::{ApiError, ApiResult};
use crate::feed::{run_feed, FeedHub, FeedStatus};
use crate::ui::INDEX_HTML;
use crate::videos::{VideoEntry, VideoLibrary};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use bytes::{Bytes, BytesMut};
use polyp_core::config::ServerConfig;
use polyp_eye::{open_video, Examination, ModelDescriptor, ToggleSnapshot};
use polyp_storage::{health_check, DbPool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const MJPEG_BOUNDARY: &str = "frame";
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub examination: Arc<Examination>,
    pub feed: Arc<FeedHub>,
    pub library: Arc<VideoLibrary>,
    pub database: Option<DbPool>,
}

impl AppState {
    pub fn new(examination: Examination, config: &ServerConfig) -> Self {
        Self {
            examination: Arc::new(examination),
            feed: Arc::new(FeedHub::new(config.stream_buffer, config.jpeg_quality)),
            library: Arc::new(VideoLibrary::new(&config.examples_dir, &config.upload_dir)),
            database: None,
        }
    }

    /// Report database health on `/health`.
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.database = Some(pool);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedRequest {
    pub video: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub toggles: ToggleSnapshot,
    pub feed: FeedStatus,
    pub model: ModelDescriptor,
}

/// Create the HTTP router with all UI and API routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/state", get(state_handler))
        .route("/api/videos", get(list_videos_handler))
        .route(
            "/api/videos/:name",
            put(upload_video_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/feed", post(feed_handler))
        .route("/api/stop", post(stop_handler))
        .route("/api/pause", post(pause_handler))
        .route("/api/resume", post(resume_handler))
        .route("/api/toggle-pause", post(toggle_pause_handler))
        .route("/api/detection", post(detection_handler))
        .route("/api/segmentation", post(segmentation_handler))
        .route("/api/stream.mjpg", get(stream_handler))
        .route("/api/frame.jpg", get(frame_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let database = match &state.database {
        Some(pool) => {
            health_check(pool)
                .await
                .map_err(|e| ApiError::Unavailable(format!("database unavailable: {}", e)))?;
            "ok"
        }
        None => "disabled",
    };
    Ok(Json(json!({
        "status": "healthy",
        "database": database,
    })))
}

async fn state_handler(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        toggles: state.examination.snapshot(),
        feed: state.feed.status(),
        model: state.examination.detector().descriptor(),
    })
}

async fn list_videos_handler(State(state): State<AppState>) -> Json<Vec<VideoEntry>> {
    Json(state.library.list())
}

async fn upload_video_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let stored = state.library.store(&name, &body).await?;
    info!("Uploaded video {} ({} bytes)", stored, body.len());
    Ok((StatusCode::CREATED, Json(json!({ "name": stored }))))
}

async fn feed_handler(
    State(state): State<AppState>,
    payload: Result<Json<FeedRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedStatus>)> {
    let request = json_body(payload)?;
    let path = state.library.resolve(&request.video)?;

    let source = tokio::task::spawn_blocking(move || open_video(&path))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let feed_id = state.feed.start(&request.video);
    let performance = state.examination.perform(source);
    let hub = Arc::clone(&state.feed);
    tokio::task::spawn_blocking(move || run_feed(hub, feed_id, performance));

    info!("Feeding {} to the endoscope (feed {})", request.video, feed_id);
    Ok((StatusCode::ACCEPTED, Json(state.feed.status())))
}

async fn stop_handler(State(state): State<AppState>) -> Json<ToggleSnapshot> {
    state.examination.stop();
    Json(state.examination.snapshot())
}

async fn pause_handler(State(state): State<AppState>) -> Json<ToggleSnapshot> {
    state.examination.pause();
    Json(state.examination.snapshot())
}

async fn resume_handler(State(state): State<AppState>) -> Json<ToggleSnapshot> {
    state.examination.resume();
    Json(state.examination.snapshot())
}

async fn toggle_pause_handler(State(state): State<AppState>) -> Json<ToggleSnapshot> {
    let paused = state.examination.toggle_pause_resume();
    debug!("Pause toggled, paused = {}", paused);
    Json(state.examination.snapshot())
}

async fn detection_handler(
    State(state): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> ApiResult<Json<ToggleSnapshot>> {
    let request = json_body(payload)?;
    state.examination.update_detection_state(request.enabled);
    Ok(Json(state.examination.snapshot()))
}

async fn segmentation_handler(
    State(state): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> ApiResult<Json<ToggleSnapshot>> {
    let request = json_body(payload)?;
    state.examination.update_segmentation_state(request.enabled);
    Ok(Json(state.examination.snapshot()))
}

async fn frame_handler(State(state): State<AppState>) -> ApiResult<Response> {
    let jpeg = state
        .feed
        .latest()
        .ok_or_else(|| ApiError::NotFound("no frame has been rendered yet".to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        jpeg,
    )
        .into_response())
}

/// Multipart MJPEG of annotated frames, starting with the latest one.
async fn stream_handler(State(state): State<AppState>) -> ApiResult<Response> {
    let receiver = state
        .feed
        .subscribe()
        .ok_or_else(|| ApiError::Unavailable("server is shutting down".to_string()))?;
    let initial = state.feed.latest();

    let live = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(jpeg) => Some(jpeg),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            debug!("Stream viewer lagged, skipped {} frames", skipped);
            None
        }
    });
    let parts = tokio_stream::iter(initial)
        .chain(live)
        .map(|jpeg| Ok::<_, Infallible>(multipart_part(&jpeg)));

    let content_type = format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY);
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response())
}

fn multipart_part(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MJPEG_BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}
