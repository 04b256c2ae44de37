//! In-memory registry of backup sources.
//!
//! The registry is a cache of the repository. It changes when the server
//! itself records or deletes snapshots, and when a refresh replaces it with
//! a freshly loaded [`RepositoryView`]. Nothing expires it on a timer.
//!
//! Readers take a shared lock and copy what they need. A reconciliation
//! builds the replacement table without holding the lock and swaps it in
//! under the exclusive lock, so readers see either the old table or the new
//! one.

use crate::models::source::{SnapshotSummary, SourceInfo};
use crate::policy::{EffectivePolicy, Policy, PolicySet, PolicyTarget};
use crate::repository::RepositoryView;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceState {
    pub latest: Option<SnapshotSummary>,
    pub policy: EffectivePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    pub source: SourceInfo,
    #[serde(flatten)]
    pub state: SourceState,
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

#[derive(Debug, Default)]
struct Table {
    sources: HashMap<SourceInfo, SourceState>,
    policies: PolicySet,
}

impl Table {
    fn from_view(view: RepositoryView) -> Self {
        let RepositoryView {
            snapshots,
            policies,
        } = view;

        let mut sources = HashMap::with_capacity(snapshots.len());
        for (source, latest) in snapshots {
            let policy = policies.effective_for(&source);
            sources.insert(
                source,
                SourceState {
                    latest: Some(latest),
                    policy,
                },
            );
        }
        // A per-source policy makes the source known even without snapshots
        for source in policies.overrides.keys() {
            if !sources.contains_key(source) {
                sources.insert(
                    source.clone(),
                    SourceState {
                        latest: None,
                        policy: policies.effective_for(source),
                    },
                );
            }
        }

        Self { sources, policies }
    }

    fn recompute_policies(&mut self) {
        let policies = &self.policies;
        for (source, state) in self.sources.iter_mut() {
            state.policy = policies.effective_for(source);
        }
    }
}

/// What one metrics scrape sees.
#[derive(Debug, Clone, Default)]
pub struct Exposure {
    pub known_sources: usize,
    pub exposed: Vec<(SourceInfo, SnapshotSummary)>,
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    table: RwLock<Table>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_view(view: RepositoryView) -> Self {
        Self {
            table: RwLock::new(Table::from_view(view)),
        }
    }

    /// Record `snapshot` as the latest for `source`, creating the entry if
    /// needed. A snapshot older than the recorded one is ignored.
    pub fn upsert(&self, source: SourceInfo, snapshot: SnapshotSummary) {
        let mut table = self.table.write();
        let policy = table.policies.effective_for(&source);
        let state = table.sources.entry(source).or_insert(SourceState {
            latest: None,
            policy,
        });

        let newer = state
            .latest
            .as_ref()
            .map(|current| snapshot.start_time >= current.start_time)
            .unwrap_or(true);
        if newer {
            state.latest = Some(snapshot);
        }
        state.policy = policy;
    }

    pub fn remove(&self, source: &SourceInfo) -> bool {
        self.table.write().sources.remove(source).is_some()
    }

    /// Drop the snapshot reference of `source` after its snapshots were
    /// deleted. The entry stays only while a per-source policy names it.
    pub fn forget_snapshots(&self, source: &SourceInfo) {
        let mut table = self.table.write();
        if table.policies.has_override(source) {
            if let Some(state) = table.sources.get_mut(source) {
                state.latest = None;
            }
        } else {
            table.sources.remove(source);
        }
    }

    pub fn get(&self, source: &SourceInfo) -> Option<SourceState> {
        self.table.read().sources.get(source).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent copy of every entry, ordered by source.
    pub fn list(&self) -> Vec<SourceEntry> {
        let mut entries: Vec<SourceEntry> = {
            let table = self.table.read();
            table
                .sources
                .iter()
                .map(|(source, state)| SourceEntry {
                    source: source.clone(),
                    state: state.clone(),
                })
                .collect()
        };
        entries.sort_by(|a, b| a.source.cmp(&b.source));
        entries
    }

    /// Known source count and the sources whose effective policy exposes
    /// metrics and which have a recorded snapshot, read under one lock.
    pub fn exposure(&self) -> Exposure {
        let table = self.table.read();
        let exposed = table
            .sources
            .iter()
            .filter(|(_, state)| state.policy.expose_metrics)
            .filter_map(|(source, state)| {
                state
                    .latest
                    .as_ref()
                    .map(|latest| (source.clone(), latest.clone()))
            })
            .collect();
        Exposure {
            known_sources: table.sources.len(),
            exposed,
        }
    }

    pub fn policy(&self, target: &PolicyTarget) -> Option<Policy> {
        self.table.read().policies.get(target).copied()
    }

    pub fn effective_policy(&self, source: &SourceInfo) -> EffectivePolicy {
        self.table.read().policies.effective_for(source)
    }

    /// Update the cached policy at `target` and re-resolve every entry.
    pub fn set_policy(&self, target: PolicyTarget, policy: Policy) {
        let mut table = self.table.write();
        if let PolicyTarget::Source(source) = &target {
            if !policy.is_empty() && !table.sources.contains_key(source) {
                table.sources.insert(
                    source.clone(),
                    SourceState {
                        latest: None,
                        policy: EffectivePolicy::default(),
                    },
                );
            }
        }
        table.policies.set(target, policy);
        table.recompute_policies();
    }

    /// Replace the whole table with one derived from `view`.
    pub fn reconcile_from(&self, view: RepositoryView) -> ReconcileSummary {
        let next = Table::from_view(view);

        let mut table = self.table.write();
        let mut summary = ReconcileSummary::default();
        for (source, state) in &next.sources {
            match table.sources.get(source) {
                None => summary.added += 1,
                Some(current) if current != state => summary.updated += 1,
                Some(_) => summary.unchanged += 1,
            }
        }
        summary.removed = table
            .sources
            .keys()
            .filter(|source| !next.sources.contains_key(*source))
            .count();

        *table = next;
        summary
    }
}
