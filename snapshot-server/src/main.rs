use snapshot_server::auth::credentials::Authenticator;
use snapshot_server::config::ServerConfig;
use snapshot_server::db::connection::close_pool;
use snapshot_server::repository::SqliteRepository;
use snapshot_server::server;
use snapshot_server::services::refresh::refresh;
use snapshot_server::state::AppState;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .init();

    let credentials = config.credentials()?;
    let tls = config.tls()?;
    let auth = Authenticator::new(credentials.ordinary.clone(), credentials.control.clone())?;

    tracing::info!("Opening repository {}", config.repo_path.display());
    let repo = Arc::new(SqliteRepository::open(&config.repo_path)?);
    let state = Arc::new(AppState::new(repo.clone(), auth, config.clone())?);

    // The registry must reflect the repository before anyone can query it
    let summary = refresh(&state).await?;
    tracing::info!("Loaded {} source(s) from repository", summary.added);

    let handle = server::start(state.clone(), &tls).await?;

    if credentials.ordinary_generated {
        eprintln!("SERVER PASSWORD: {}", credentials.ordinary.password());
    }
    if credentials.control_generated {
        eprintln!("SERVER CONTROL PASSWORD: {}", credentials.control.password());
    }
    eprintln!("SERVER CERT SHA256: {}", handle.fingerprint);
    eprintln!("SERVER ADDRESS: https://{}", handle.api_addr);
    if let Some(addr) = handle.metrics_addr {
        eprintln!("METRICS ADDRESS: http://{}/metrics", addr);
    }

    tokio::spawn(shutdown_signal(state.shutdown.clone()));

    handle.wait().await?;

    close_pool(repo.pool());
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = cancel.cancelled() => return,
    }

    cancel.cancel();
}
