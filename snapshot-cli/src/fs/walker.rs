//! Directory traversal producing snapshot statistics.

use snapshot_server::models::source::SnapshotStats;
use std::path::Path;
use walkdir::WalkDir;

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Entry names skipped along with everything below them
    pub exclude_names: Vec<String>,
}

/// Count directories, files and bytes under `root`. The root itself counts
/// as a directory. Entries that cannot be read are skipped with a warning.
pub fn scan(root: &Path, options: &WalkOptions) -> std::io::Result<SnapshotStats> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Ok(SnapshotStats {
            total_dirs: 0,
            total_files: 1,
            total_bytes: meta.len() as i64,
        });
    }

    let mut stats = SnapshotStats::default();
    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !options
                    .exclude_names
                    .iter()
                    .any(|name| e.file_name().to_string_lossy() == name.as_str())
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            stats.total_dirs += 1;
        } else if file_type.is_file() {
            stats.total_files += 1;
            match entry.metadata() {
                Ok(m) => stats.total_bytes += m.len() as i64,
                Err(e) => tracing::warn!("Cannot stat {}: {}", entry.path().display(), e),
            }
        }
    }

    Ok(stats)
}
