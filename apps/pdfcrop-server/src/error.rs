//! Error types for the pdfcrop server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfcrop_core::CropError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upload failed: {0}")]
    Upload(#[from] MultipartError),

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body. `error` carries the message, as clients expect.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Upload(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, "UPLOAD_TOO_LARGE")
            }
            ApiError::Upload(_) => (StatusCode::BAD_REQUEST, "INVALID_UPLOAD"),
            ApiError::Crop(CropError::Input(_)) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::Crop(CropError::PageProcessing { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PAGE_PROCESSING_FAILED")
            }
            ApiError::Crop(CropError::Persistence(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILED")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            ApiError::Upload(err) => err.body_text(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            error!(code, "{}", message);
        } else {
            warn!(code, "{}", message);
        }

        let body = ErrorResponse {
            error: message,
            code,
        };
        (status, Json(body)).into_response()
    }
}
