//! Error types for the segmentation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfsegment_core::SegmentError;
use serde::Serialize;
use thiserror::Error;

use crate::store::MetadataError;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("PDF metadata not found: {0}")]
    PdfNotFound(String),

    #[error("Segmentation timeout after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Segment(#[from] SegmentError),

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
        let (status, code, message) = match &self {
            ServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ServerError::PdfNotFound(_) => (
                StatusCode::NOT_FOUND,
                "PDF_NOT_FOUND",
                "PDF metadata not found".to_string(),
            ),
            ServerError::Timeout(ms) => (
                StatusCode::REQUEST_TIMEOUT,
                "TIMEOUT",
                format!("Segmentation timeout after {}ms", ms),
            ),
            ServerError::Segment(err @ SegmentError::InvalidDocument(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_DOCUMENT", err.to_string())
            }
            ServerError::Segment(err @ SegmentError::InvalidCutCount(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_CUT_COUNT", err.to_string())
            }
            ServerError::Segment(err) => {
                tracing::error!("Segmentation failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SEGMENTATION_FAILED",
                    format!("Error processing PDF file: {}", err),
                )
            }
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    msg.clone(),
                )
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<MetadataError> for ServerError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(id) => ServerError::PdfNotFound(id),
            other => ServerError::Internal(other.to_string()),
        }
    }
}
