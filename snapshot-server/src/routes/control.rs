//! Administrative endpoints, callable only with the control credential.

use crate::error::AppError;
use crate::registry::ReconcileSummary;
use crate::services::refresh::refresh_detached;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sources": state.registry.len(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "shuttingDown": state.shutdown.is_cancelled(),
    }))
}

/// Reconcile the registry with the repository and answer once applied.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileSummary>, AppError> {
    let summary = refresh_detached(state).await?;
    Ok(Json(summary))
}

/// Stop accepting connections; in-flight requests, this one included,
/// are allowed to finish.
pub async fn shutdown(State(state): State<Arc<AppState>>) -> Json<Value> {
    tracing::info!("Shutdown requested over control channel");
    state.shutdown.cancel();
    Json(json!({ "status": "shutting down" }))
}
