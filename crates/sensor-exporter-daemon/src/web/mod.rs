//! HTTP exposition endpoints.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Config, HEALTH_PATH};
use crate::state::AppState;

/// Creates the web router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let metrics_path = state.metrics_path().to_string();
    Router::new()
        .route("/", get(index))
        .route(HEALTH_PATH, get(healthz))
        .route(&metrics_path, get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured address and serves until the server fails.
pub async fn serve(config: &Config, state: Arc<AppState>) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Serving metrics on http://{}{}", addr, config.path);

    axum::serve(listener, create_router(state))
        .await
        .context("HTTP server failed")
}

/// GET / - Landing page
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let path = state.metrics_path();
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Sensor Exporter</title></head>\n<body>\n\
         <h1>Sensor Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         <p><a href=\"{HEALTH_PATH}\">Health</a></p>\n\
         </body>\n</html>\n"
    ))
}

/// GET /healthz - Liveness check
async fn healthz() -> &'static str {
    "OK"
}

/// GET <metrics path> - One scrape in the Prometheus text format
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.scrape().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("Scrape failed: {}", e);
            let status = if e.is_unavailable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, format!("Scrape failed: {}\n", e)).into_response()
        }
    }
}
