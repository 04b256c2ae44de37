//! Client side of the server's HTTPS API.

pub mod client;
pub mod pinning;

pub use client::{ApiClient, ServerStatus};
