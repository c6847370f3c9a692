//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chess_analysis::{AnalysisError, CacheError, PositionError};
use serde_json::json;
use thiserror::Error;

use crate::pgn::PgnError;

/// Error returned by API handlers, rendered as `{"detail": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        // Engine failures map to 400, same as invalid positions.
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PositionError> for ApiError {
    fn from(err: PositionError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PgnError> for ApiError {
    fn from(err: PgnError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(format!("Database error: {}", err))
    }
}
