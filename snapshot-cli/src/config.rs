//! Configuration for the snapshot CLI.
//!
//! Loaded from an optional TOML file; command-line flags override it.

use crate::utils::{CliError, Result};
use serde::{Deserialize, Serialize};
use snapshot_server::models::source::SourceInfo;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository database file, shared with the server
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,
}

/// Host and user recorded on new snapshots. Detected when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub host: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from("repository.db")
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn host(&self) -> String {
        self.identity.host.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string())
        })
    }

    pub fn user(&self) -> String {
        self.identity.user.clone().unwrap_or_else(|| {
            std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string())
        })
    }

    /// Identify the source at `path` as this host and user see it. A path
    /// that no longer exists is accepted when it is already absolute.
    pub fn source_for(&self, path: &Path) -> Result<SourceInfo> {
        let absolute = match std::fs::canonicalize(path) {
            Ok(p) => p,
            Err(_) if path.is_absolute() => path.to_path_buf(),
            Err(e) => {
                return Err(CliError::Config(format!(
                    "cannot resolve {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(SourceInfo::new(
            self.host(),
            self.user(),
            absolute.to_string_lossy(),
        ))
    }
}
