//! Router construction and the serve loop.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::api::{publish, uploaders, versions, web};
use crate::config::Config;
use crate::error::AppResult;
use crate::state::AppState;

/// Multipart framing allowed on top of the archive itself.
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Every route the registry serves.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config
        .limits
        .max_upload_size
        .saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/api/packages/versions/new", get(publish::upload_url))
        .route("/api/packages/versions/newUpload", post(publish::upload))
        .route(
            "/api/packages/versions/newUploadFinish",
            get(publish::upload_finish),
        )
        .route("/api/packages/{name}", get(versions::list_versions))
        .route(
            "/api/packages/{name}/versions/{version}",
            get(versions::get_version),
        )
        .route(
            "/packages/{name}/versions/{archive}",
            get(versions::download),
        )
        .route(
            "/api/packages/{name}/uploaders",
            post(uploaders::add_uploader).delete(uploaders::remove_uploader_form),
        )
        .route(
            "/api/packages/{name}/uploaders/{email}",
            delete(uploaders::remove_uploader),
        )
        .route("/webapi/packages", get(web::list_packages))
        .route("/webapi/package/{name}/{version}", get(web::package_detail))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let packages = state.packages.count().await?;
    let archives = state.artifacts.count().await?;
    Ok(Json(json!({
        "status": "ok",
        "service": "pubstead",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.backend.kind(),
        "upstream": {
            "url": state.resolution.upstream_base(),
            "mode": state.config.upstream.mode,
            "enabled": state.config.upstream.enabled,
        },
        "packages": packages,
        "archives": archives,
    })))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal, stopping gracefully");
}

/// Serve until SIGINT or SIGTERM.
pub async fn run_server(config: Config) -> Result<()> {
    url::Url::parse(&config.upstream.url)
        .with_context(|| format!("Invalid upstream URL {}", config.upstream.url))?;
    url::Url::parse(&config.public_url())
        .with_context(|| format!("Invalid public URL {}", config.public_url()))?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid socket address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = AppState::from_config(config).map_err(|e| {
        error!(error = %e, "Failed to initialise registry state");
        anyhow::anyhow!("Failed to initialise registry state: {e}")
    })?;
    info!(
        storage = state.backend.kind(),
        data_dir = %state.config.storage.data_dir.display(),
        upstream = %state.config.upstream.url,
        public_url = %state.server_addr,
        "Registry state ready"
    );

    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!(addr = %addr, "Pubstead listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
