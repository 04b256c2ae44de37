use crate::auth::credentials::Authenticator;
use crate::auth::session::SessionStore;
use crate::config::ServerConfig;
use crate::metrics::MetricsExporter;
use crate::registry::SourceRegistry;
use crate::repository::Repository;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub registry: Arc<SourceRegistry>,
    pub metrics: MetricsExporter,
    pub auth: Authenticator,
    pub sessions: SessionStore,
    pub config: ServerConfig,
    /// Cancelled by the control `shutdown` call or a signal.
    pub shutdown: CancellationToken,
    /// Held for the whole of a refresh and across every server-side write,
    /// so a listing taken before a write is never applied after it.
    pub refresh_lock: Mutex<()>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn Repository>,
        auth: Authenticator,
        config: ServerConfig,
    ) -> anyhow::Result<Self> {
        let registry = Arc::new(SourceRegistry::new());
        let metrics = MetricsExporter::new(registry.clone())?;
        let sessions = SessionStore::new(
            chrono::Duration::minutes(config.session_ttl_mins),
            config.session_capacity,
        );

        Ok(Self {
            repo,
            registry,
            metrics,
            auth,
            sessions,
            config,
            shutdown: CancellationToken::new(),
            refresh_lock: Mutex::new(()),
            started_at: Instant::now(),
        })
    }
}
