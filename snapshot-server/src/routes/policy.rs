use crate::auth::Caller;
use crate::error::AppError;
use crate::models::source::SourceInfo;
use crate::policy::{effective_policy, EffectivePolicy, Policy, PolicyTarget};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyQuery {
    pub host: Option<String>,
    pub user_name: Option<String>,
    pub path: Option<String>,
}

impl PolicyQuery {
    fn target(self) -> Result<PolicyTarget, AppError> {
        match (self.host, self.user_name, self.path) {
            (None, None, None) => Ok(PolicyTarget::Global),
            (Some(host), Some(user_name), Some(path)) => {
                Ok(PolicyTarget::Source(SourceInfo::new(host, user_name, path)))
            }
            _ => Err(AppError::BadRequest(
                "give all of host, userName and path, or none for the global policy".into(),
            )),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResponse {
    pub source: Option<SourceInfo>,
    pub policy: Policy,
    pub effective: EffectivePolicy,
}

fn respond(state: &AppState, target: PolicyTarget) -> PolicyResponse {
    let policy = state.registry.policy(&target).unwrap_or_default();
    match target {
        PolicyTarget::Global => PolicyResponse {
            source: None,
            policy,
            effective: effective_policy(Some(&policy), None),
        },
        PolicyTarget::Source(source) => PolicyResponse {
            effective: state.registry.effective_policy(&source),
            source: Some(source),
            policy,
        },
    }
}

pub async fn get_policy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PolicyQuery>,
) -> Result<Json<PolicyResponse>, AppError> {
    let target = query.target()?;
    Ok(Json(respond(&state, target)))
}

#[derive(Deserialize)]
pub struct SetPolicyRequest {
    /// Omitted for the global policy
    #[serde(default)]
    pub source: Option<SourceInfo>,
    pub policy: Policy,
}

pub async fn set_policy(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<SetPolicyRequest>,
) -> Result<Json<PolicyResponse>, AppError> {
    let target = match body.source {
        Some(source) => PolicyTarget::Source(source),
        None => PolicyTarget::Global,
    };
    let policy = body.policy;

    let _serialized = state.refresh_lock.lock().await;
    let repo = state.repo.clone();
    let stored = target.clone();
    tokio::task::spawn_blocking(move || repo.set_policy(&stored, &policy))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;

    state.registry.set_policy(target.clone(), policy);
    tracing::info!("Policy updated for {:?} by {}", target, caller.username);
    Ok(Json(respond(&state, target)))
}
