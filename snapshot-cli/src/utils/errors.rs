//! Error types for the snapshot CLI.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// The connection failed before any request was sent, including a
    /// server certificate that does not match the pinned fingerprint.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repository error: {0:#}")]
    Repository(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
