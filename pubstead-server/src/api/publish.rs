//! The three-step publish handshake used by `dart pub publish`:
//! ask for an upload URL, post the archive there, then follow the redirect to
//! the finish endpoint.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::identity::Caller;
use crate::state::{AppState, SuccessResponse};
use crate::validation::MAX_MULTIPART_FIELDS;

#[derive(Debug, Serialize)]
pub struct UploadUrl {
    pub url: String,
    pub fields: Map<String, Value>,
}

/// `GET /api/packages/versions/new`
pub async fn upload_url(State(state): State<Arc<AppState>>) -> Json<UploadUrl> {
    Json(UploadUrl {
        url: format!("{}/api/packages/versions/newUpload", state.server_addr),
        fields: Map::new(),
    })
}

/// Pull the first file part whose name contains `.tar.gz`.
async fn archive_field(mut multipart: Multipart) -> AppResult<Bytes> {
    let mut field_count = 0;
    while let Some(field) = multipart.next_field().await? {
        field_count += 1;
        if field_count > MAX_MULTIPART_FIELDS {
            return Err(AppError::BadRequest(format!(
                "upload form has more than {MAX_MULTIPART_FIELDS} fields"
            )));
        }

        let is_archive = field
            .file_name()
            .is_some_and(|file_name| file_name.contains(".tar.gz"));
        if is_archive {
            debug!(file_name = ?field.file_name(), "Reading uploaded archive");
            return Ok(field.bytes().await?);
        }
    }
    Err(AppError::BadRequest(
        "upload form does not contain a .tar.gz file".to_string(),
    ))
}

/// `POST /api/packages/versions/newUpload`
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Caller(email): Caller,
    multipart: Multipart,
) -> AppResult<Response> {
    let archive = archive_field(multipart).await?;
    let published = state.uploads.publish(&email, archive).await?;
    info!(package = %published.package, version = %published.version, "Upload accepted");

    let finish = format!("{}/api/packages/versions/newUploadFinish", state.server_addr);
    Ok((StatusCode::FOUND, [(header::LOCATION, finish)]).into_response())
}

/// `GET /api/packages/versions/newUploadFinish`
pub async fn upload_finish() -> Json<SuccessResponse> {
    Json(SuccessResponse::new("Successfully uploaded package"))
}
