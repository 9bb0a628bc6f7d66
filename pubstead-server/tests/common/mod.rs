//! Shared fixtures for the HTTP tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Router};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use flate2::{write::GzEncoder, Compression};
use pubstead_server::config::{Config, StorageBackendKind, UpstreamMode};
use pubstead_server::storage::{FsBackend, KvBackend, MemoryBackend};
use pubstead_server::{build_router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PUBLIC_URL: &str = "http://localhost:4000";
pub const OWNER: &str = "owner@example.com";
pub const DART_PUB_UA: &str = "Dart pub 3.4.0";
pub const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0";

pub struct TestApp {
    pub server: TestServer,
    pub router: Router,
    pub state: Arc<AppState>,
    pub temp_dir: Option<TempDir>,
}

impl TestApp {
    /// Send a raw request through the router, for inspecting redirects.
    pub async fn oneshot(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get_raw(&self, uri: &str, user_agent: &str) -> Response {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", user_agent)
            .body(Body::empty())
            .unwrap();
        self.oneshot(request).await
    }

    pub async fn publish(&self, archive: Vec<u8>) -> TestResponse {
        self.server
            .post("/api/packages/versions/newUpload")
            .multipart(upload_form(archive))
            .await
    }

    pub async fn downloads(&self, name: &str) -> u64 {
        self.state.packages.get(name).await.unwrap().downloads()
    }
}

/// Memory storage, single static uploader, redirect fallback to pub.dev.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackendKind::Memory;
    config.server.public_url = Some(PUBLIC_URL.to_string());
    config.security.default_uploader = OWNER.to_string();
    config.upstream.mode = UpstreamMode::Redirect;
    config
}

pub fn token_config(tokens: &[(&str, &str)]) -> Config {
    let mut config = test_config();
    config.security.tokens = tokens
        .iter()
        .map(|(token, email)| (token.to_string(), email.to_string()))
        .collect::<BTreeMap<_, _>>();
    config
}

pub fn app_with_backend(config: Config, backend: Arc<dyn KvBackend>) -> TestApp {
    let state = Arc::new(AppState::with_backend(config, backend).unwrap());
    let router = build_router(Arc::clone(&state));
    let server = TestServer::new(router.clone()).unwrap();
    TestApp {
        server,
        router,
        state,
        temp_dir: None,
    }
}

pub fn app_with(config: Config) -> TestApp {
    app_with_backend(config, Arc::new(MemoryBackend::new()))
}

pub fn test_app() -> TestApp {
    app_with(test_config())
}

/// App over an on-disk backend rooted at `dir`.
pub fn disk_app(dir: &std::path::Path) -> TestApp {
    app_with_backend(test_config(), Arc::new(FsBackend::new(dir)))
}

pub fn pubspec(name: &str, version: &str) -> String {
    format!("name: {name}\nversion: {version}\ndescription: {name} for tests\n")
}

pub fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Archive with a pubspec, readme and changelog.
pub fn package_archive(name: &str, version: &str) -> Vec<u8> {
    build_archive(&[
        ("pubspec.yaml", &pubspec(name, version)),
        ("README.md", &format!("# {name}")),
        ("CHANGELOG.md", &format!("## {version}")),
        ("lib/src/impl.dart", "void main() {}"),
    ])
}

pub fn upload_form(archive: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(archive)
            .file_name("package.tar.gz")
            .mime_type("application/octet-stream"),
    )
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
