use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a managed backup target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub host: String,
    pub user_name: String,
    pub path: String,
}

impl SourceInfo {
    pub fn new(host: impl Into<String>, user_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user_name: user_name.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user_name, self.host, self.path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub total_dirs: i64,
    pub total_files: i64,
    pub total_bytes: i64,
}

/// Reference to one snapshot manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub stats: SnapshotStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSnapshot {
    pub source: SourceInfo,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub stats: SnapshotStats,
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<(SourceInfo, SnapshotSummary)> {
    let source = SourceInfo {
        host: row.get("host")?,
        user_name: row.get("username")?,
        path: row.get("path")?,
    };
    let summary = SnapshotSummary {
        id: row.get("id")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        stats: SnapshotStats {
            total_dirs: row.get("total_dirs")?,
            total_files: row.get("total_files")?,
            total_bytes: row.get("total_bytes")?,
        },
    };
    Ok((source, summary))
}

/// Latest snapshot of every source that has at least one.
pub fn find_latest_per_source(conn: &Connection) -> anyhow::Result<Vec<(SourceInfo, SnapshotSummary)>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM snapshots ORDER BY host, username, path, start_time DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| row_to_snapshot(row))?;

    let mut latest: Vec<(SourceInfo, SnapshotSummary)> = Vec::new();
    for row in rows {
        let (source, summary) = row?;
        // Rows arrive newest-first within a source
        if latest.last().map(|(s, _)| s != &source).unwrap_or(true) {
            latest.push((source, summary));
        }
    }
    Ok(latest)
}

pub fn find_by_source(conn: &Connection, source: &SourceInfo) -> anyhow::Result<Vec<SnapshotSummary>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM snapshots WHERE host = ? AND username = ? AND path = ? ORDER BY start_time DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![source.host, source.user_name, source.path], |row| {
        row_to_snapshot(row).map(|(_, summary)| summary)
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn create(conn: &Connection, data: &NewSnapshot) -> anyhow::Result<SnapshotSummary> {
    let id = Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO snapshots (id, host, username, path, start_time, end_time, total_dirs, total_files, total_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            data.source.host,
            data.source.user_name,
            data.source.path,
            data.start_time,
            data.end_time,
            data.stats.total_dirs,
            data.stats.total_files,
            data.stats.total_bytes,
        ],
    )?;
    Ok(SnapshotSummary {
        id,
        start_time: data.start_time,
        end_time: data.end_time,
        stats: data.stats,
    })
}

pub fn delete_by_source(conn: &Connection, source: &SourceInfo) -> anyhow::Result<usize> {
    let changes = conn.execute(
        "DELETE FROM snapshots WHERE host = ? AND username = ? AND path = ?",
        params![source.host, source.user_name, source.path],
    )?;
    Ok(changes)
}
