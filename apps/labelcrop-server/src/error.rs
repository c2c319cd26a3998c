//! Error types for the labelcrop server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use labelcrop_core::LabelCropError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed upload: {}", .0.body_text())]
    Multipart(#[from] MultipartError),

    #[error("No PDF files were uploaded")]
    NoFiles,

    #[error(transparent)]
    Pipeline(#[from] LabelCropError),

    #[error("Failed to build archive: {0}")]
    Archive(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ServerError::Multipart(err) => (err.status(), "INVALID_UPLOAD"),
            ServerError::NoFiles => (StatusCode::BAD_REQUEST, "NO_FILES"),
            ServerError::Pipeline(LabelCropError::ParseError(_)) => {
                (StatusCode::BAD_REQUEST, "PARSE_ERROR")
            }
            ServerError::Pipeline(LabelCropError::NoInput) => (StatusCode::BAD_REQUEST, "NO_FILES"),
            ServerError::Pipeline(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PROCESSING_ERROR"),
            ServerError::Archive(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ARCHIVE_ERROR"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        tracing::error!(code, "Error processing PDFs: {}", self);

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<zip::result::ZipError> for ServerError {
    fn from(err: zip::result::ZipError) -> Self {
        ServerError::Archive(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Archive(err.to_string())
    }
}
