//! Commands that talk to a running server.

use crate::api::{ApiClient, ServerStatus};
use crate::utils::Result;
use clap::Args;
use snapshot_server::registry::SourceEntry;
use std::fmt::Write;

/// Where the server is and which certificate it must present.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Server address (host:port or https:// URL)
    #[arg(long, env = "SNAPSHOT_SERVER_ADDRESS")]
    pub address: String,

    /// SHA-256 fingerprint of the server certificate, as printed at startup
    #[arg(long, env = "SNAPSHOT_SERVER_CERT_FINGERPRINT")]
    pub server_cert_fingerprint: String,
}

#[derive(Debug, Clone, Args)]
pub struct ControlArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(long, env = "SNAPSHOT_SERVER_CONTROL_USERNAME", default_value = "server-control")]
    pub server_control_username: String,

    #[arg(long, env = "SNAPSHOT_SERVER_CONTROL_PASSWORD", hide_env_values = true)]
    pub server_control_password: String,
}

#[derive(Debug, Clone, Args)]
pub struct UserArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(long, env = "SNAPSHOT_SERVER_USERNAME", default_value = "kopia")]
    pub server_username: String,

    #[arg(long, env = "SNAPSHOT_SERVER_PASSWORD", hide_env_values = true)]
    pub server_password: String,
}

impl ControlArgs {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(
            &self.server.address,
            &self.server.server_cert_fingerprint,
            &self.server_control_username,
            &self.server_control_password,
        )
    }
}

impl UserArgs {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(
            &self.server.address,
            &self.server.server_cert_fingerprint,
            &self.server_username,
            &self.server_password,
        )
    }
}

pub fn format_sources(entries: &[SourceEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let latest = match &entry.state.latest {
            Some(s) => format!(
                "{} dirs:{} files:{} bytes:{}",
                s.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
                s.stats.total_dirs,
                s.stats.total_files,
                s.stats.total_bytes
            ),
            None => "no snapshots".to_string(),
        };
        let metrics = if entry.state.policy.expose_metrics {
            ""
        } else {
            " (metrics hidden)"
        };
        let _ = writeln!(out, "{}  {}{}", entry.source, latest, metrics);
    }
    out
}

pub fn format_status(status: &ServerStatus) -> String {
    format!(
        "status: {}\nversion: {}\nsources: {}\nuptime: {}s\nshutting down: {}\n",
        status.status, status.version, status.sources, status.uptime_secs, status.shutting_down
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use snapshot_server::models::source::{SnapshotStats, SnapshotSummary, SourceInfo};
    use snapshot_server::policy::EffectivePolicy;
    use snapshot_server::registry::SourceState;

    #[test]
    fn test_format_sources() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let entries = vec![
            SourceEntry {
                source: SourceInfo::new("h", "u", "/a"),
                state: SourceState {
                    latest: Some(SnapshotSummary {
                        id: "1".into(),
                        start_time: start,
                        end_time: start,
                        stats: SnapshotStats {
                            total_dirs: 2,
                            total_files: 3,
                            total_bytes: 4,
                        },
                    }),
                    policy: EffectivePolicy::default(),
                },
            },
            SourceEntry {
                source: SourceInfo::new("h", "u", "/b"),
                state: SourceState {
                    latest: None,
                    policy: EffectivePolicy {
                        expose_metrics: false,
                    },
                },
            },
        ];

        let text = format_sources(&entries);
        assert_eq!(
            text,
            "u@h:/a  2026-03-01 12:00:00 UTC dirs:2 files:3 bytes:4\n\
             u@h:/b  no snapshots (metrics hidden)\n"
        );
    }
}
