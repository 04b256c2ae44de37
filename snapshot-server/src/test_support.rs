//! Fixtures shared by unit tests.

use crate::auth::credentials::{Authenticator, Credential};
use crate::config::ServerConfig;
use crate::models::source::{NewSnapshot, SnapshotStats, SnapshotSummary, SourceInfo};
use crate::policy::{Policy, PolicySet, PolicyTarget};
use crate::repository::{Repository, RepositoryView};
use crate::state::AppState;
use base64::Engine;
use clap::Parser;
use parking_lot::Mutex;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

pub const USER: &str = "kopia";
pub const USER_PASSWORD: &str = "user-secret";
pub const CONTROL: &str = "server-control";
pub const CONTROL_PASSWORD: &str = "control-secret";

/// In-memory repository whose reads can be made to fail or to pause.
#[derive(Default)]
pub struct MemoryRepository {
    snapshots: Mutex<Vec<(SourceInfo, SnapshotSummary)>>,
    policies: Mutex<PolicySet>,
    failing: Mutex<bool>,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl MemoryRepository {
    pub fn fail(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Make the next `load_view` signal `entered` once it has taken its
    /// listing, then block until `release` fires.
    pub fn gate_next_load(&self, entered: Sender<()>, release: Receiver<()>) {
        *self.gate.lock() = Some((entered, release));
    }
}

impl Repository for MemoryRepository {
    fn load_view(&self) -> anyhow::Result<RepositoryView> {
        if *self.failing.lock() {
            anyhow::bail!("repository unavailable");
        }
        let gate = self.gate.lock().take();
        let mut latest: Vec<(SourceInfo, SnapshotSummary)> = Vec::new();
        for (source, snapshot) in self.snapshots.lock().iter() {
            match latest.iter_mut().find(|(s, _)| s == source) {
                Some((_, current)) if current.start_time <= snapshot.start_time => {
                    *current = snapshot.clone();
                }
                Some(_) => {}
                None => latest.push((source.clone(), snapshot.clone())),
            }
        }
        let view = RepositoryView {
            snapshots: latest,
            policies: self.policies.lock().clone(),
        };

        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        Ok(view)
    }

    fn record_snapshot(&self, data: &NewSnapshot) -> anyhow::Result<SnapshotSummary> {
        let summary = SnapshotSummary {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: data.start_time,
            end_time: data.end_time,
            stats: data.stats,
        };
        self.snapshots
            .lock()
            .push((data.source.clone(), summary.clone()));
        Ok(summary)
    }

    fn delete_source(&self, source: &SourceInfo) -> anyhow::Result<usize> {
        let mut snapshots = self.snapshots.lock();
        let before = snapshots.len();
        snapshots.retain(|(s, _)| s != source);
        Ok(before - snapshots.len())
    }

    fn set_policy(&self, target: &PolicyTarget, policy: &Policy) -> anyhow::Result<()> {
        self.policies.lock().set(target.clone(), *policy);
        Ok(())
    }
}

pub fn summary(id: &str) -> SnapshotSummary {
    let now = chrono::Utc::now();
    SnapshotSummary {
        id: id.to_string(),
        start_time: now,
        end_time: now,
        stats: SnapshotStats {
            total_dirs: 1,
            total_files: 1,
            total_bytes: 1,
        },
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::try_parse_from([
        "snapshot-server",
        "--server-password",
        USER_PASSWORD,
        "--server-control-password",
        CONTROL_PASSWORD,
        "--tls-generate-cert",
    ])
    .unwrap()
}

pub fn state_with_repo(repo: Arc<dyn Repository>) -> Arc<AppState> {
    state_with_config(repo, test_config())
}

pub fn state_with_config(repo: Arc<dyn Repository>, config: ServerConfig) -> Arc<AppState> {
    let auth = Authenticator::new(
        Credential::new(USER, USER_PASSWORD),
        Credential::new(CONTROL, CONTROL_PASSWORD),
    )
    .unwrap();
    Arc::new(AppState::new(repo, auth, config).unwrap())
}

pub fn basic(user: &str, pass: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
    )
}
