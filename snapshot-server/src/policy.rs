//! Policy resolution.
//!
//! Policies form a two-level hierarchy: one global policy and optional
//! per-source overrides. A field set on the override always wins, then the
//! global value, then the built-in default.

use crate::models::source::SourceInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_EXPOSE_METRICS: bool = true;

/// A single policy level. Unset fields inherit from the level above.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_metrics: Option<bool>,
}

impl Policy {
    pub fn is_empty(&self) -> bool {
        self.expose_metrics.is_none()
    }
}

/// Fully resolved policy with no unset fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePolicy {
    pub expose_metrics: bool,
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        Self {
            expose_metrics: DEFAULT_EXPOSE_METRICS,
        }
    }
}

/// Where a policy applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyTarget {
    Global,
    Source(SourceInfo),
}

/// Merge a global policy with an optional per-source override.
pub fn effective_policy(global: Option<&Policy>, source: Option<&Policy>) -> EffectivePolicy {
    let expose_metrics = source
        .and_then(|p| p.expose_metrics)
        .or_else(|| global.and_then(|p| p.expose_metrics))
        .unwrap_or(DEFAULT_EXPOSE_METRICS);

    EffectivePolicy { expose_metrics }
}

/// The global policy plus every per-source override known to the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySet {
    pub global: Option<Policy>,
    pub overrides: HashMap<SourceInfo, Policy>,
}

impl PolicySet {
    pub fn effective_for(&self, source: &SourceInfo) -> EffectivePolicy {
        effective_policy(self.global.as_ref(), self.overrides.get(source))
    }

    pub fn get(&self, target: &PolicyTarget) -> Option<&Policy> {
        match target {
            PolicyTarget::Global => self.global.as_ref(),
            PolicyTarget::Source(source) => self.overrides.get(source),
        }
    }

    /// Replace the policy at `target`. An empty policy removes the level.
    pub fn set(&mut self, target: PolicyTarget, policy: Policy) {
        let policy = (!policy.is_empty()).then_some(policy);
        match (target, policy) {
            (PolicyTarget::Global, p) => self.global = p,
            (PolicyTarget::Source(source), Some(p)) => {
                self.overrides.insert(source, p);
            }
            (PolicyTarget::Source(source), None) => {
                self.overrides.remove(&source);
            }
        }
    }

    pub fn has_override(&self, source: &SourceInfo) -> bool {
        self.overrides.contains_key(source)
    }
}
