//! HTTP API for the playback terminal and the request devices.
//!
//! Routes:
//! - `GET|POST /config` - media roots
//! - `GET /videos/:filename`, `GET /sounds/:filename` - range-aware streaming
//! - `GET /videos/resolve/:number` - resolution diagnostics
//! - `GET|POST|DELETE /queue`, `DELETE /queue/:id`, `DELETE /queue/at/:index`,
//!   `POST /queue/move` - the shared queue
//! - `GET /test` - liveness

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::media::{MediaError, MediaServer};
use crate::queue::{QueueEntry, QueueError, QueueStore};
use crate::registry::{ConfigRegistry, MediaKind, MediaRoots};
use crate::resolve::{self, ResolveError};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: ConfigRegistry,
    pub queue: QueueStore,
    pub media: MediaServer,
}

impl AppState {
    pub fn new(roots: MediaRoots) -> Self {
        Self {
            registry: ConfigRegistry::new(roots),
            queue: QueueStore::new(),
            media: MediaServer::new(),
        }
    }
}

/// Failures as the client sees them.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input (400).
    #[error("{0}")]
    InvalidInput(String),

    /// Nothing to serve (404).
    #[error("{0}")]
    NotFound(String),

    /// File type not allowed. Reported as 400.
    #[error("{0}")]
    Forbidden(String),

    /// Anything unexpected (500). Details stay in the server log.
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::Forbidden(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Error for streaming routes, rendered as a short plain-text body.
#[derive(Debug)]
pub struct StreamError(pub ApiError);

impl From<ApiError> for StreamError {
    fn from(e: ApiError) -> Self {
        StreamError(e)
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        (self.0.status(), self.0.to_string()).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotFound(_) => ApiError::NotFound("queue entry not found".to_string()),
            other => ApiError::InvalidInput(other.to_string()),
        }
    }
}

fn not_found_message(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "video not found",
        MediaKind::Audio => "sound not found",
    }
}

/// Maps a resolver failure for `kind`, logging what the client won't see.
fn resolve_failure(kind: MediaKind, e: ResolveError) -> ApiError {
    match e {
        ResolveError::InvalidName(_) => {
            tracing::warn!(%kind, error = %e, "rejected media name");
            ApiError::InvalidInput("invalid file name".to_string())
        }
        ResolveError::RootUnavailable(_) | ResolveError::NotFound { .. } => {
            tracing::warn!(%kind, error = %e, "media not resolved");
            ApiError::NotFound(not_found_message(kind).to_string())
        }
    }
}

fn media_failure(kind: MediaKind, e: MediaError) -> ApiError {
    if e.is_not_found() {
        tracing::warn!(%kind, error = %e, "media vanished before streaming");
        ApiError::NotFound(not_found_message(kind).to_string())
    } else {
        tracing::error!(%kind, error = %e, "media streaming failed");
        ApiError::Internal
    }
}

/// Runs filesystem-bound resolver work off the async workers.
async fn run_resolver<T, F>(kind: MediaKind, work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ResolveError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(|e| resolve_failure(kind, e)),
        Err(e) => {
            tracing::error!(%kind, error = %e, "resolver task failed");
            Err(ApiError::Internal)
        }
    }
}

/// Parses a JSON request body; an empty body yields the default value.
fn parse_json_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "unparsable request body");
        ApiError::InvalidInput("invalid JSON body".to_string())
    })
}

#[derive(Serialize, Deserialize)]
struct OkResponse {
    ok: bool,
}

// ============================================================================
// Config
// ============================================================================

/// Handler for GET /config
async fn get_config(State(state): State<AppState>) -> Json<MediaRoots> {
    Json(state.registry.snapshot().await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigUpdate {
    #[serde(default)]
    videos_path: Option<Value>,
    #[serde(default)]
    sounds_path: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    ok: bool,
    #[serde(flatten)]
    roots: MediaRoots,
}

/// Handler for POST /config
///
/// Only non-blank string fields are applied; everything else is ignored.
async fn update_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConfigResponse>, ApiError> {
    let update: ConfigUpdate = parse_json_body(&body)?;

    if let Some(Value::String(path)) = &update.videos_path {
        state.registry.set(MediaKind::Video, path).await;
    }
    if let Some(Value::String(path)) = &update.sounds_path {
        state.registry.set(MediaKind::Audio, path).await;
    }

    Ok(Json(ConfigResponse {
        ok: true,
        roots: state.registry.snapshot().await,
    }))
}

// ============================================================================
// Media
// ============================================================================

/// Handler for GET /videos/:filename
async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let kind = MediaKind::Video;
    let root = state.registry.root(kind).await;
    tracing::info!(%filename, root = %root.display(), "video requested");

    let path = run_resolver(kind, move || resolve::resolve(&root, kind, &filename)).await?;
    tracing::debug!(path = %path.display(), "video resolved");

    let response = state
        .media
        .serve(&path, headers.get(header::RANGE))
        .await
        .map_err(|e| media_failure(kind, e))?;
    Ok(response)
}

/// Handler for GET /sounds/:filename
async fn stream_sound(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let kind = MediaKind::Audio;
    if !resolve::has_allowed_extension(&filename, kind) {
        tracing::warn!(%filename, "sound request with disallowed extension");
        return Err(ApiError::Forbidden("file type not allowed".to_string()).into());
    }

    let root = state.registry.root(kind).await;
    tracing::info!(%filename, root = %root.display(), "sound requested");

    let path = run_resolver(kind, move || resolve::resolve_exact(&root, kind, &filename)).await?;

    let response = state
        .media
        .serve(&path, headers.get(header::RANGE))
        .await
        .map_err(|e| media_failure(kind, e))?;
    Ok(response)
}

/// Body of GET /videos/resolve/:number
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub videos_path: String,
    pub number: String,
    pub exact: String,
    pub exists_exact: bool,
    pub candidates: Vec<String>,
    pub resolved: Option<String>,
}

/// Handler for GET /videos/resolve/:number
async fn resolve_video(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<ResolveReport>, ApiError> {
    let kind = MediaKind::Video;
    let videos_path = state.registry.get(kind).await;
    let root = PathBuf::from(&videos_path);
    let id = number.clone();

    let resolution = run_resolver(kind, move || resolve::inspect(&root, kind, &id)).await?;

    Ok(Json(ResolveReport {
        videos_path,
        number,
        exact: resolution.exact.display().to_string(),
        exists_exact: resolution.exists_exact,
        candidates: resolution.candidates,
        resolved: resolution.resolved.map(|p| p.display().to_string()),
    }))
}

// ============================================================================
// Queue
// ============================================================================

/// Handler for GET /queue
async fn list_queue(State(state): State<AppState>) -> Json<Vec<QueueEntry>> {
    Json(state.queue.list().await)
}

#[derive(Debug, Default, Deserialize)]
struct EnqueueRequest {
    #[serde(default)]
    song: Option<Value>,
    #[serde(default)]
    singer: Option<Value>,
}

/// Singer names arrive as strings, occasionally as numbers.
fn singer_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Handler for POST /queue
async fn enqueue(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<QueueEntry>), ApiError> {
    let request: EnqueueRequest = parse_json_body(&body)?;
    let singer = singer_text(request.singer.as_ref());
    let song = request.song.unwrap_or(Value::Null);

    let entry = state.queue.enqueue(song, &singer).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Handler for DELETE /queue/:id
async fn remove_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state.queue.remove_by_id(&id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Handler for DELETE /queue/at/:index
async fn dequeue_at(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<Json<QueueEntry>, ApiError> {
    let index = index
        .parse::<usize>()
        .map_err(|_| ApiError::InvalidInput("index must be a non-negative integer".to_string()))?;
    let entry = state.queue.remove_by_index(index).await?;
    Ok(Json(entry))
}

#[derive(Debug, Default, Deserialize)]
struct MoveRequest {
    from: Option<usize>,
    to: Option<usize>,
}

/// Handler for POST /queue/move
async fn move_entry(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<OkResponse>, ApiError> {
    let request: MoveRequest = parse_json_body(&body)?;
    let (Some(from), Some(to)) = (request.from, request.to) else {
        return Err(ApiError::InvalidInput("from and to are required".to_string()));
    };

    if !state.queue.move_entry(from, to).await {
        return Err(ApiError::InvalidInput("index out of range".to_string()));
    }
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Serialize, Deserialize)]
struct ClearResponse {
    ok: bool,
    removed: usize,
}

/// Handler for DELETE /queue
async fn clear_queue(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.queue.clear().await;
    Json(ClearResponse { ok: true, removed })
}

/// Handler for GET /test
async fn health() -> Json<Value> {
    Json(serde_json::json!({ "message": "Server running" }))
}

/// Creates the axum Router with every endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/config", get(get_config).post(update_config))
        .route("/videos/resolve/:number", get(resolve_video))
        .route("/videos/:filename", get(stream_video))
        .route("/sounds/:filename", get(stream_sound))
        .route("/queue", get(list_queue).post(enqueue).delete(clear_queue))
        .route("/queue/move", post(move_entry))
        .route("/queue/at/:index", delete(dequeue_at))
        .route("/queue/:id", delete(remove_entry))
        .route("/test", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
