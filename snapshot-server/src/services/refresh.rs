//! Reconciliation of the source registry with the repository.
//!
//! Out-of-band repository changes (for example a snapshot deleted from the
//! CLI while the server runs) are invisible to the server until a refresh
//! reloads the listing and swaps it into the registry.

use crate::error::AppError;
use crate::registry::ReconcileSummary;
use crate::state::AppState;
use std::sync::Arc;

/// Reload the repository listing and apply it to the registry.
///
/// The listing is read on the blocking pool without touching the registry
/// lock. On failure the registry keeps its previous contents.
pub async fn refresh(state: &AppState) -> Result<ReconcileSummary, AppError> {
    let _serialized = state.refresh_lock.lock().await;

    let repo = state.repo.clone();
    let view = tokio::task::spawn_blocking(move || repo.load_view())
        .await
        .map_err(|e| AppError::Reconciliation(format!("repository listing task failed: {e}")))?
        .map_err(|e| AppError::Reconciliation(format!("{e:#}")))?;

    let summary = state.registry.reconcile_from(view);
    tracing::info!(
        "Refreshed sources: {} added, {} updated, {} removed, {} unchanged",
        summary.added,
        summary.updated,
        summary.removed,
        summary.unchanged
    );
    Ok(summary)
}

/// Run a refresh to completion even if the caller stops waiting.
pub async fn refresh_detached(state: Arc<AppState>) -> Result<ReconcileSummary, AppError> {
    tokio::spawn(async move { refresh(&state).await })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}
