//! Uploader management endpoints.

use std::sync::Arc;

use axum::{
    extract::{Form, Path, State},
    response::Json,
};
use serde::Deserialize;

use crate::access;
use crate::error::AppResult;
use crate::identity::Caller;
use crate::state::{AppState, SuccessResponse};

#[derive(Debug, Deserialize)]
pub struct UploaderForm {
    pub email: String,
}

/// `POST /api/packages/{name}/uploaders`
pub async fn add_uploader(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(name): Path<String>,
    Form(form): Form<UploaderForm>,
) -> AppResult<Json<SuccessResponse>> {
    access::add_uploader(&state.packages, &name, &actor, &form.email).await?;
    Ok(Json(SuccessResponse::new(format!(
        "{} added as an uploader of {name}",
        form.email.trim()
    ))))
}

/// `DELETE /api/packages/{name}/uploaders/{email}`
pub async fn remove_uploader(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path((name, email)): Path<(String, String)>,
) -> AppResult<Json<SuccessResponse>> {
    remove(&state, &name, &actor, &email).await
}

/// `DELETE /api/packages/{name}/uploaders` with a form-encoded `email`.
pub async fn remove_uploader_form(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(name): Path<String>,
    Form(form): Form<UploaderForm>,
) -> AppResult<Json<SuccessResponse>> {
    remove(&state, &name, &actor, &form.email).await
}

async fn remove(
    state: &AppState,
    name: &str,
    actor: &str,
    email: &str,
) -> AppResult<Json<SuccessResponse>> {
    access::remove_uploader(&state.packages, name, actor, email).await?;
    Ok(Json(SuccessResponse::new(format!(
        "{} removed from the uploaders of {name}",
        email.trim()
    ))))
}
