//! Admin API route handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::settings::BridgeSettings;
use crate::state::AppState;
use crate::{Error, Result};

/// Build the admin router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/states/:path", get(get_state).put(put_state))
        .route("/api/poller/stop", put(stop_poller))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "polling": state.poller.is_running().await,
    }))
}

async fn get_settings(State(state): State<AppState>) -> Json<BridgeSettings> {
    // Password stays obscured on the wire, same as the legacy admin page
    Json(state.settings.get().await)
}

/// Replace settings; the poll loop picks them up on restart
async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<BridgeSettings>,
) -> Result<impl IntoResponse> {
    state.settings.replace(settings).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "saved": true, "note": "restart to apply connection settings" })),
    ))
}

async fn get_state(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse> {
    let stored = state
        .store
        .get_state(&path)
        .await?
        .ok_or_else(|| Error::NotFound(format!("No state at {}", path)))?;
    Ok(Json(stored))
}

/// User write: pushed to the NVR, then mirrored back acknowledged
async fn put_state(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(value): Json<Value>,
) -> Result<impl IntoResponse> {
    state.poller.apply_setting(&path, value).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_poller(State(state): State<AppState>) -> impl IntoResponse {
    state.poller.stop().await;
    StatusCode::NO_CONTENT
}
