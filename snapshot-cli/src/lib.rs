//! Snapshot CLI library
//!
//! Repository commands and a pinned-certificate client for the snapshot
//! server's API.

pub mod api;
pub mod commands;
pub mod config;
pub mod fs;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::CliError;
pub type Result<T> = std::result::Result<T, CliError>;
