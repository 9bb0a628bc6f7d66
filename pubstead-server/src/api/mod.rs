//! HTTP handlers for the pub repository API and the web listing API.
//!
//! Handlers stay thin: they extract request data, call into the registry
//! core, and map the outcome to a response. Local misses on read routes go
//! through [`defer_upstream`].

pub mod publish;
pub mod uploaders;
pub mod versions;
pub mod web;

use axum::{
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::config::UpstreamMode;
use crate::error::AppResult;
use crate::state::AppState;

/// Path plus query of the incoming request, used to build the upstream URL.
pub(crate) fn request_path(uri: &Uri) -> &str {
    uri.path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path())
}

/// Answer a local miss from the public registry, by redirect or by proxying.
pub(crate) async fn defer_upstream(state: &AppState, url: String) -> AppResult<Response> {
    match state.resolution.mode() {
        UpstreamMode::Redirect => Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response()),
        UpstreamMode::Proxy => {
            let upstream = state.upstream.fetch(&url).await?;
            let content_type = upstream
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            Ok(([(header::CONTENT_TYPE, content_type)], upstream.body).into_response())
        }
    }
}
