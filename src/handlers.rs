use std::fmt::Display;

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    extractor::DownloadTarget,
    files::{self, CleanupStream, TransientFile},
    formats::VideoInfo,
    state::AppState,
    validation::{is_valid_youtube_url, sanitize_filename},
};

#[derive(Debug, Deserialize)]
pub struct VideoInfoRequest {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    #[default]
    Video,
    Audio,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    url: String,
    #[serde(default, deserialize_with = "deserialize_mode")]
    format: DownloadMode,
    format_id: Option<String>,
}

/// Only `"audio"` selects the audio branch; any other value, including
/// `null` or a non-string, downloads video.
fn deserialize_mode<'de, D>(deserializer: D) -> Result<DownloadMode, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value.as_ref().and_then(serde_json::Value::as_str) {
        Some("audio") => DownloadMode::Audio,
        _ => DownloadMode::Video,
    })
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn video_info(
    State(state): State<AppState>,
    payload: Result<Json<VideoInfoRequest>, JsonRejection>,
) -> Result<Json<VideoInfo>, ApiError> {
    let Json(payload) = payload.map_err(rejected_body)?;
    let url = validate_url(&payload.url)?;

    let raw = state.extractor.fetch_info(url).await.map_err(|error| {
        warn!("Metadata extraction failed for {:?}: {error}", url);
        ApiError::internal(format!("Failed to fetch video info: {error}"))
    })?;

    let raw_count = raw.formats.len();
    let info = VideoInfo::from_raw(raw);
    debug!(
        "Kept {} of {raw_count} formats for {:?}",
        info.formats.len(),
        url
    );

    Ok(Json(info))
}

pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(rejected_body)?;
    let url = validate_url(&payload.url)?;

    info!(
        "Download request url={:?} format={:?} format_id={:?}",
        url, payload.format, payload.format_id
    );

    files::cleanup_stale_jobs(&state.download_dir, state.stale_job_seconds).await;

    let job_dir = state.download_dir.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&job_dir)
        .await
        .map_err(download_failed)?;

    let target = match payload.format {
        DownloadMode::Audio => DownloadTarget::Audio,
        DownloadMode::Video => DownloadTarget::Video {
            format_id: payload.format_id,
        },
    };

    let produced = state
        .extractor
        .download(url, &target, &job_dir)
        .await
        .map_err(|error| {
            warn!("Download failed for {:?}: {error}", url);
            download_failed(error)
        })?;

    let base = sanitize_filename(produced.title.as_deref().unwrap_or_default());
    let ext = match target {
        DownloadTarget::Audio => ".mp3".to_string(),
        DownloadTarget::Video { .. } => format!(
            ".{}",
            produced
                .ext
                .as_deref()
                .map(str::trim)
                .filter(|ext| !ext.is_empty())
                .unwrap_or("mp4")
        ),
    };

    let reported = match produced.filepath.as_deref() {
        Some(reported) => files::reported_output(&job_dir, reported)
            .await
            .map_err(download_failed)?,
        None => None,
    };
    let located = match reported {
        Some(path) => Some(path),
        None => files::locate_output(&job_dir, &base, &ext)
            .await
            .map_err(download_failed)?,
    };
    let Some(path) = located else {
        warn!("No output named {base:?}*{ext} in {:?}", job_dir);
        return Err(ApiError::internal("Download completed but file not found"));
    };

    let path = files::normalize_artifact_name(path)
        .await
        .map_err(download_failed)?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToString::to_string)
        .unwrap_or_else(|| "download".to_string());

    let metadata = tokio::fs::metadata(&path).await.map_err(download_failed)?;
    let file = tokio::fs::File::open(&path).await.map_err(download_failed)?;
    let transient = TransientFile::new(path, job_dir);
    debug!(
        "Streaming {:?} ({} bytes)",
        transient.path(),
        metadata.len()
    );
    let body = Body::from_stream(CleanupStream::new(ReaderStream::new(file), transient));

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(files::content_type_for_filename(&filename)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&files::build_content_disposition(&filename))
            .map_err(download_failed)?,
    );

    Ok((headers, body).into_response())
}

fn validate_url(raw: &str) -> Result<&str, ApiError> {
    let url = raw.trim();
    if url.is_empty() {
        debug!("Rejected request without URL");
        return Err(ApiError::bad_request("URL is required"));
    }
    if !is_valid_youtube_url(url) {
        debug!("Rejected non-YouTube URL {:?}", url);
        return Err(ApiError::bad_request("Invalid YouTube URL"));
    }
    Ok(url)
}

fn rejected_body(rejection: JsonRejection) -> ApiError {
    debug!("Rejected request body: {rejection}");
    ApiError::bad_request(rejection.body_text())
}

fn download_failed(error: impl Display) -> ApiError {
    ApiError::internal(format!("Download failed: {error}"))
}
