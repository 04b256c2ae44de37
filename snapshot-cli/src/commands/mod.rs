//! Command implementations. Repository commands write the repository file
//! directly; a running server only sees their effect after a refresh.

pub mod policy;
pub mod remote;
pub mod snapshot;

use crate::config::Config;
use crate::utils::Result;
use snapshot_server::repository::SqliteRepository;

pub fn open_repository(config: &Config) -> Result<SqliteRepository> {
    tracing::debug!("Opening repository {}", config.repository.path.display());
    Ok(SqliteRepository::open(&config.repository.path)?)
}
