use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error returned from every handler, rendered as `{ "error": ... }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Failures surfaced by the media extraction collaborator.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("yt-dlp is not installed or not on PATH")]
    NotInstalled,

    #[error("could not run yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("could not parse yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("yt-dlp produced no output")]
    EmptyOutput,
}
