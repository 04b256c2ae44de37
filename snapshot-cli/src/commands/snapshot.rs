use crate::config::Config;
use crate::fs::walker::{scan, WalkOptions};
use crate::utils::Result;
use chrono::Utc;
use snapshot_server::models::source::{NewSnapshot, SnapshotSummary, SourceInfo};
use snapshot_server::repository::{Repository, SqliteRepository};
use std::path::Path;

/// Walk `path` and record a snapshot of it in the repository.
pub fn create(
    repo: &SqliteRepository,
    config: &Config,
    path: &Path,
    options: &WalkOptions,
) -> Result<(SourceInfo, SnapshotSummary)> {
    let source = config.source_for(path)?;
    let start_time = Utc::now();
    let stats = scan(Path::new(&source.path), options)?;

    let snapshot = NewSnapshot {
        source: source.clone(),
        start_time,
        end_time: Utc::now(),
        stats,
    };
    let summary = repo.record_snapshot(&snapshot)?;
    tracing::info!("Created snapshot {} of {}", summary.id, source);
    Ok((source, summary))
}

pub fn list(repo: &SqliteRepository, config: &Config, path: &Path) -> Result<(SourceInfo, Vec<SnapshotSummary>)> {
    let source = config.source_for(path)?;
    let snapshots = repo.snapshots_for(&source)?;
    Ok((source, snapshots))
}

/// Delete every snapshot of the source at `path`. Without `confirm` only
/// counts what would be deleted.
pub fn delete_all_for_source(
    repo: &SqliteRepository,
    config: &Config,
    path: &Path,
    confirm: bool,
) -> Result<(SourceInfo, usize)> {
    let source = config.source_for(path)?;
    if !confirm {
        let count = repo.snapshots_for(&source)?.len();
        return Ok((source, count));
    }

    let deleted = repo.delete_source(&source)?;
    tracing::info!("Deleted {} snapshot(s) of {}", deleted, source);
    Ok((source, deleted))
}
