//! Repository access.
//!
//! The repository is the persistent store of snapshot manifests and
//! policies. The CLI writes it directly; the server reads it when it
//! rebuilds the source registry.

use crate::db::connection::{create_pool, DbPool};
use crate::db::migrate::migrate;
use crate::models::source::{NewSnapshot, SnapshotSummary, SourceInfo};
use crate::models::{policy, source};
use crate::policy::{Policy, PolicySet, PolicyTarget};
use std::path::Path;

/// Authoritative listing of the repository at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RepositoryView {
    /// Latest snapshot of every source that has one.
    pub snapshots: Vec<(SourceInfo, SnapshotSummary)>,
    pub policies: PolicySet,
}

/// Blocking repository operations. Callers on the async runtime go through
/// `spawn_blocking`.
pub trait Repository: Send + Sync + 'static {
    fn load_view(&self) -> anyhow::Result<RepositoryView>;

    fn record_snapshot(&self, data: &NewSnapshot) -> anyhow::Result<SnapshotSummary>;

    /// Delete every snapshot of `source`, returning how many were removed.
    fn delete_source(&self, source: &SourceInfo) -> anyhow::Result<usize>;

    fn set_policy(&self, target: &PolicyTarget, policy: &Policy) -> anyhow::Result<()>;
}

pub struct SqliteRepository {
    db: DbPool,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = create_pool(path)?;
        migrate(&db)?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }

    pub fn snapshots_for(&self, source: &SourceInfo) -> anyhow::Result<Vec<SnapshotSummary>> {
        let conn = self.db.get()?;
        source::find_by_source(&conn, source)
    }

    pub fn get_policy(&self, target: &PolicyTarget) -> anyhow::Result<Option<Policy>> {
        let conn = self.db.get()?;
        policy::get(&conn, target)
    }
}

impl Repository for SqliteRepository {
    fn load_view(&self) -> anyhow::Result<RepositoryView> {
        let mut conn = self.db.get()?;
        // One read transaction so snapshots and policies agree
        let tx = conn.transaction()?;
        let snapshots = source::find_latest_per_source(&tx)?;
        let policies = policy::load_all(&tx)?;
        tx.commit()?;
        Ok(RepositoryView { snapshots, policies })
    }

    fn record_snapshot(&self, data: &NewSnapshot) -> anyhow::Result<SnapshotSummary> {
        let conn = self.db.get()?;
        source::create(&conn, data)
    }

    fn delete_source(&self, source: &SourceInfo) -> anyhow::Result<usize> {
        let conn = self.db.get()?;
        source::delete_by_source(&conn, source)
    }

    fn set_policy(&self, target: &PolicyTarget, policy: &Policy) -> anyhow::Result<()> {
        let conn = self.db.get()?;
        policy::set(&conn, target, policy)
    }
}
