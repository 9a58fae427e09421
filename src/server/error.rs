//! HTTP error responses with a structured JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{ErrorKind, Xml2PdfError};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// Request-level errors with their status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file or XML data provided")]
    NoPayload,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Conversion(#[from] Xml2PdfError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NoPayload => (StatusCode::BAD_REQUEST, "NO_PAYLOAD", self.to_string()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::Conversion(e) => {
                let code = match e.kind() {
                    ErrorKind::MalformedInput => "MALFORMED_INPUT",
                    ErrorKind::MissingRequiredField => "MISSING_FIELD",
                    ErrorKind::RenderFailure => "RENDER_FAILED",
                    ErrorKind::SigningFailure => "SIGNING_FAILED",
                    ErrorKind::Io => "STORAGE_FAILED",
                    ErrorKind::Config => "CONFIG",
                    ErrorKind::Internal => "INTERNAL",
                };
                if e.is_bad_input() {
                    (StatusCode::BAD_REQUEST, code, e.to_string())
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        code,
                        format!("Error processing input: {}", e),
                    )
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "Upload failed");
        } else {
            tracing::warn!(code, %message, "Upload rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}
