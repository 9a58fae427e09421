//! Route handlers.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use super::error::ApiError;
use super::AppState;
use crate::storage::ErrorRecord;

/// Source name for raw XML bodies, which carry no file name.
pub const RAW_BODY_SOURCE: &str = "request.xml";

const UPLOAD_FORM: &str = r#"<!DOCTYPE html>
<html lang="ru">
<head>
<meta charset="utf-8">
<title>XML → PDF</title>
<style>
body { font-family: sans-serif; max-width: 40em; margin: 3em auto; }
fieldset { padding: 1.5em; }
button { margin-top: 1em; }
</style>
</head>
<body>
<h1>Загрузка XML</h1>
<form action="/upload/" method="post" enctype="multipart/form-data" target="_blank">
<fieldset>
<legend>Файл заявки</legend>
<input type="file" name="file" accept=".xml,application/xml,text/xml" required>
<br>
<button type="submit">Сформировать PDF</button>
</fieldset>
</form>
</body>
</html>
"#;

pub async fn index() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// The error record; empty when storage is not configured.
pub async fn errors(State(state): State<AppState>) -> Result<Json<ErrorRecord>, ApiError> {
    match state.pipeline.storage() {
        Some(storage) => Ok(Json(storage.errors().await?)),
        None => Ok(Json(ErrorRecord::new())),
    }
}

/// Convert an uploaded XML document into a signed PDF.
pub async fn upload(State(state): State<AppState>, req: Request) -> Response {
    match upload_inner(&state, req).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn upload_inner(state: &AppState, req: Request) -> Result<Response, ApiError> {
    let (source, bytes) = read_payload(req).await?;
    info!(source = %source, bytes = bytes.len(), "Upload received");

    match state.pipeline.convert_bytes(&source, bytes).await {
        Ok(output) => Ok(pdf_response(StatusCode::OK, output.pdf)),
        Err(e) if e.is_bad_input() && state.placeholder_on_bad_input => {
            warn!(source = %source, "Bad input, answering with placeholder: {}", e);
            let pdf = state.pipeline.placeholder_for(&source).await?;
            Ok(pdf_response(StatusCode::BAD_REQUEST, pdf))
        }
        Err(e) => Err(e.into()),
    }
}

/// Pull the XML out of a multipart `file` field or a raw XML body.
async fn read_payload(req: Request) -> Result<(String, Vec<u8>), ApiError> {
    let mime = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "multipart/form-data" => {
            let mut multipart = Multipart::from_request(req, &())
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?
            {
                if field.name() != Some("file") {
                    continue;
                }
                let name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(RAW_BODY_SOURCE)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                if bytes.is_empty() {
                    break;
                }
                return Ok((name, bytes.to_vec()));
            }
            Err(ApiError::NoPayload)
        }
        "application/xml" | "text/xml" => {
            let bytes = Bytes::from_request(req, &())
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            if bytes.is_empty() {
                return Err(ApiError::NoPayload);
            }
            Ok((RAW_BODY_SOURCE.to_string(), bytes.to_vec()))
        }
        _ => Err(ApiError::NoPayload),
    }
}

fn pdf_response(status: StatusCode, pdf: Vec<u8>) -> Response {
    (
        status,
        [
            (CONTENT_TYPE, "application/pdf"),
            (CONTENT_DISPOSITION, "inline; filename=document.pdf"),
        ],
        pdf,
    )
        .into_response()
}
