use crate::auth::Caller;
use crate::error::AppError;
use crate::models::source::{NewSnapshot, SnapshotSummary, SourceInfo};
use crate::registry::SourceEntry;
use crate::state::AppState;
use axum::extract::State;
use axum::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceEntry>,
}

pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.registry.list(),
    })
}

fn validate_source(source: &SourceInfo) -> Result<(), AppError> {
    if source.host.is_empty() || source.user_name.is_empty() || source.path.is_empty() {
        return Err(AppError::BadRequest(
            "source host, userName and path are required".into(),
        ));
    }
    Ok(())
}

/// Store a finished snapshot manifest and make it visible immediately.
pub async fn record_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<NewSnapshot>,
) -> Result<(StatusCode, Json<SnapshotSummary>), AppError> {
    validate_source(&body.source)?;
    if body.end_time < body.start_time {
        return Err(AppError::BadRequest("endTime is before startTime".into()));
    }

    let _serialized = state.refresh_lock.lock().await;
    let repo = state.repo.clone();
    let source = body.source.clone();
    let summary = tokio::task::spawn_blocking(move || repo.record_snapshot(&body))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;

    tracing::info!("Recorded snapshot {} for {} ({})", summary.id, source, caller.username);
    state.registry.upsert(source, summary.clone());
    Ok((StatusCode::CREATED, Json(summary)))
}

#[derive(Deserialize)]
pub struct DeleteSourceRequest {
    pub source: SourceInfo,
}

/// Delete every snapshot of a source.
pub async fn delete_source(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<DeleteSourceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_source(&body.source)?;

    let _serialized = state.refresh_lock.lock().await;
    let repo = state.repo.clone();
    let source = body.source.clone();
    let deleted = tokio::task::spawn_blocking(move || repo.delete_source(&source))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;

    if deleted == 0 && state.registry.get(&body.source).is_none() {
        return Err(AppError::NotFound(format!("source {} not found", body.source)));
    }

    state.registry.forget_snapshots(&body.source);
    tracing::info!("Deleted {} snapshot(s) of {} ({})", deleted, body.source, caller.username);
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
