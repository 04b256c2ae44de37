//! HTTPS client for the snapshot server.
//!
//! Every request carries HTTP Basic credentials. Mutating calls made with
//! the ordinary credential first fetch a CSRF token and session cookie.

use super::pinning::{pinned_client_config, PinnedCertVerifier};
use crate::utils::{CliError, Result};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use snapshot_server::auth::session::{CSRF_HEADER, SESSION_COOKIE};
use snapshot_server::models::source::{NewSnapshot, SnapshotSummary};
use snapshot_server::registry::{ReconcileSummary, SourceEntry};
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub status: String,
    pub version: String,
    pub sources: usize,
    pub uptime_secs: u64,
    pub shutting_down: bool,
}

#[derive(Deserialize)]
struct SourcesResponse {
    sources: Vec<SourceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    csrf_token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    verifier: Arc<PinnedCertVerifier>,
}

impl ApiClient {
    /// `address` is `host:port` or an `https://` URL.
    pub fn new(address: &str, fingerprint: &str, username: &str, password: &str) -> Result<Self> {
        let base_url = normalize_address(address)?;
        let (tls, verifier) = pinned_client_config(fingerprint)
            .map_err(|e| CliError::Config(format!("TLS configuration: {e}")))?;

        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
            verifier,
        })
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceEntry>> {
        let resp = self.send(self.http.get(self.url("/api/v1/sources"))).await?;
        Ok(decode::<SourcesResponse>(resp).await?.sources)
    }

    pub async fn status(&self) -> Result<ServerStatus> {
        let resp = self.send(self.http.get(self.url("/api/v1/control/status"))).await?;
        decode(resp).await
    }

    /// Ask the server to reconcile with the repository. Returns once the
    /// new listing has been applied.
    pub async fn refresh(&self) -> Result<ReconcileSummary> {
        let resp = self.send(self.http.post(self.url("/api/v1/control/refresh"))).await?;
        decode(resp).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(self.http.post(self.url("/api/v1/control/shutdown"))).await?;
        Ok(())
    }

    pub async fn record_snapshot(&self, snapshot: &NewSnapshot) -> Result<SnapshotSummary> {
        let (cookie, token) = self.session().await?;
        let req = self
            .http
            .post(self.url("/api/v1/snapshots"))
            .header(COOKIE, cookie)
            .header(CSRF_HEADER, token)
            .json(snapshot);
        decode(self.send(req).await?).await
    }

    /// Start a session, returning the cookie pair and its CSRF token.
    async fn session(&self) -> Result<(String, String)> {
        let resp = self.send(self.http.get(self.url("/api/v1/session"))).await?;

        let cookie = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .find(|pair| pair.starts_with(&format!("{SESSION_COOKIE}=")))
            .map(str::to_string)
            .ok_or_else(|| CliError::Server {
                status: resp.status().as_u16(),
                message: "server did not set a session cookie".into(),
            })?;

        let body: SessionResponse = decode(resp).await?;
        Ok((cookie, body.csrf_token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = match resp.text().await {
            Ok(text) => serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text),
            Err(e) => e.to_string(),
        };
        Err(match status {
            StatusCode::UNAUTHORIZED => CliError::Authentication(message),
            StatusCode::FORBIDDEN => CliError::Authorization(message),
            _ => CliError::Server {
                status: status.as_u16(),
                message,
            },
        })
    }

    fn classify(&self, err: reqwest::Error) -> CliError {
        if let Some(actual) = self.verifier.take_rejected() {
            return CliError::Transport(format!(
                "server certificate fingerprint {} does not match expected {}",
                actual,
                self.verifier.expected()
            ));
        }
        if err.is_connect() || err.is_timeout() {
            return CliError::Transport(err.to_string());
        }
        CliError::Http(err)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim().trim_end_matches('/');
    if address.is_empty() {
        return Err(CliError::Config("server address is empty".into()));
    }
    if address.starts_with("http://") {
        return Err(CliError::Config(
            "the server only accepts HTTPS connections".into(),
        ));
    }
    if address.starts_with("https://") {
        Ok(address.to_string())
    } else {
        Ok(format!("https://{address}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalization() {
        assert_eq!(normalize_address("127.0.0.1:51515").unwrap(), "https://127.0.0.1:51515");
        assert_eq!(
            normalize_address("https://localhost:1234/").unwrap(),
            "https://localhost:1234"
        );
        assert!(matches!(normalize_address("http://localhost:1"), Err(CliError::Config(_))));
        assert!(matches!(normalize_address(" "), Err(CliError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&addr.to_string(), "00", "u", "p").unwrap();
        assert!(matches!(client.status().await, Err(CliError::Transport(_))));
    }
}
