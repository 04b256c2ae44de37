use crate::auth::credentials::{random_password, Credential};
use crate::tls::TlsMaterial;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server settings. Every flag can also come from the environment (or a
/// `.env` file).
#[derive(Debug, Clone, Parser)]
#[command(name = "snapshot-server", version, about = "Snapshot server with metrics and control channel")]
pub struct ServerConfig {
    /// Main API listen address (TLS)
    #[arg(long, env = "SNAPSHOT_ADDRESS", default_value = "127.0.0.1:51515")]
    pub address: SocketAddr,

    /// Metrics listen address; metrics are disabled when unset
    #[arg(long, env = "SNAPSHOT_METRICS_LISTEN_ADDR")]
    pub metrics_listen_addr: Option<SocketAddr>,

    /// Repository database file
    #[arg(long, env = "SNAPSHOT_REPO_PATH", default_value = "repository.db")]
    pub repo_path: PathBuf,

    #[arg(long, env = "SNAPSHOT_SERVER_USERNAME", default_value = "kopia")]
    pub server_username: String,

    #[arg(long, env = "SNAPSHOT_SERVER_PASSWORD", hide_env_values = true)]
    pub server_password: Option<String>,

    /// Generate a random server password and print it at startup
    #[arg(long)]
    pub random_password: bool,

    #[arg(long, env = "SNAPSHOT_SERVER_CONTROL_USERNAME", default_value = "server-control")]
    pub server_control_username: String,

    #[arg(long, env = "SNAPSHOT_SERVER_CONTROL_PASSWORD", hide_env_values = true)]
    pub server_control_password: Option<String>,

    /// Generate a random control password and print it at startup
    #[arg(long)]
    pub random_server_control_password: bool,

    #[arg(long, env = "SNAPSHOT_TLS_CERT_FILE")]
    pub tls_cert_file: Option<PathBuf>,

    #[arg(long, env = "SNAPSHOT_TLS_KEY_FILE")]
    pub tls_key_file: Option<PathBuf>,

    /// Generate a self-signed certificate (written to the cert/key files when given)
    #[arg(long)]
    pub tls_generate_cert: bool,

    /// Subject alternative names for a generated certificate
    #[arg(long, value_delimiter = ',', default_value = "localhost,127.0.0.1")]
    pub tls_cert_names: Vec<String>,

    /// How long in-flight requests may run after shutdown starts
    #[arg(long, env = "SNAPSHOT_SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Lifetime of a CSRF session
    #[arg(long, env = "SNAPSHOT_SESSION_TTL_MINS", default_value_t = 60)]
    pub session_ttl_mins: i64,

    /// Most CSRF sessions kept at once; the oldest is evicted when full
    #[arg(long, env = "SNAPSHOT_SESSION_CAPACITY", default_value_t = 1024)]
    pub session_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Both credential sets, and whether each password was generated.
pub struct Credentials {
    pub ordinary: Credential,
    pub control: Credential,
    pub ordinary_generated: bool,
    pub control_generated: bool,
}

impl ServerConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        let (ordinary, ordinary_generated) = pick_password(
            self.server_password.as_deref(),
            self.random_password,
            "--server-password or --random-password",
        )?;
        let (control, control_generated) = pick_password(
            self.server_control_password.as_deref(),
            self.random_server_control_password,
            "--server-control-password or --random-server-control-password",
        )?;

        Ok(Credentials {
            ordinary: Credential::new(&self.server_username, ordinary),
            control: Credential::new(&self.server_control_username, control),
            ordinary_generated,
            control_generated,
        })
    }

    pub fn tls(&self) -> anyhow::Result<TlsMaterial> {
        let files = self.tls_cert_file.as_ref().zip(self.tls_key_file.as_ref());

        if self.tls_generate_cert {
            let material = TlsMaterial::generate(&self.tls_cert_names)?;
            if let Some((cert, key)) = files {
                if cert.exists() || key.exists() {
                    anyhow::bail!("refusing to overwrite existing TLS certificate or key");
                }
                material.save(cert, key)?;
                tracing::info!("Wrote generated certificate to {}", cert.display());
            }
            return Ok(material);
        }

        match files {
            Some((cert, key)) => TlsMaterial::load(cert, key),
            None => anyhow::bail!(
                "TLS is required: pass --tls-generate-cert or both --tls-cert-file and --tls-key-file"
            ),
        }
    }
}

fn pick_password(explicit: Option<&str>, random: bool, hint: &str) -> anyhow::Result<(String, bool)> {
    match (explicit, random) {
        (Some(p), _) if !p.is_empty() => Ok((p.to_string(), false)),
        (_, true) => Ok((random_password(), true)),
        _ => anyhow::bail!("a password is required: pass {hint}"),
    }
}
