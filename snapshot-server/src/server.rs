//! Listeners: the TLS main API and the plain metrics endpoint.
//!
//! Both stop accepting when the shared shutdown token is cancelled. Open
//! API connections are asked to finish their current requests and are
//! waited on for at most the configured grace period.

use crate::metrics::metrics_router;
use crate::routes::create_router;
use crate::state::AppState;
use crate::tls::TlsMaterial;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServerHandle {
    pub api_addr: SocketAddr,
    pub metrics_addr: Option<SocketAddr>,
    pub fingerprint: String,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait until every listener has stopped and drained.
    pub async fn wait(self) -> anyhow::Result<()> {
        for task in self.tasks {
            task.await??;
        }
        Ok(())
    }
}

/// Bind both listeners and start serving in the background.
pub async fn start(state: Arc<AppState>, tls: &TlsMaterial) -> anyhow::Result<ServerHandle> {
    let shutdown = state.shutdown.clone();
    let grace = Duration::from_secs(state.config.shutdown_grace_secs);

    let api_listener = TcpListener::bind(state.config.address).await?;
    let api_addr = api_listener.local_addr()?;
    let acceptor = TlsAcceptor::from(tls.server_config()?);
    let app = create_router(state.clone());
    tracing::info!("API listening on https://{}", api_addr);

    let mut tasks = vec![tokio::spawn(serve_tls(
        api_listener,
        acceptor,
        app,
        shutdown.clone(),
        grace,
    ))];

    let metrics_addr = match state.config.metrics_listen_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr).await?;
            let local = listener.local_addr()?;
            let router = metrics_router(state.metrics.clone());
            let token = shutdown.clone();
            tracing::info!("Metrics listening on http://{}/metrics", local);
            tasks.push(tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(token.cancelled_owned())
                    .await?;
                tracing::info!("Metrics listener stopped");
                Ok(())
            }));
            Some(local)
        }
        None => None,
    };

    Ok(ServerHandle {
        api_addr,
        metrics_addr,
        fingerprint: tls.fingerprint(),
        shutdown,
        tasks,
    })
}

async fn serve_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()> {
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            let stream = match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => {
                    tracing::debug!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
                Err(_) => {
                    tracing::debug!("TLS handshake with {} timed out", peer);
                    return;
                }
            };

            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder
                .serve_connection_with_upgrades(TokioIo::new(stream), TowerToHyperService::new(app));
            tokio::pin!(conn);

            let mut draining = false;
            loop {
                tokio::select! {
                    res = conn.as_mut() => {
                        if let Err(e) = res {
                            tracing::debug!("Connection from {} ended with error: {}", peer, e);
                        }
                        break;
                    }
                    _ = shutdown.cancelled(), if !draining => {
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        });
    }

    // Stop accepting before draining
    drop(listener);
    tracing::info!("API listener closed, draining {} connection(s)", connections.len());

    connections.close();
    if tokio::time::timeout(grace, connections.wait()).await.is_err() {
        tracing::warn!("Connections still open after {:?}, giving up on drain", grace);
    }
    tracing::info!("API listener stopped");
    Ok(())
}
