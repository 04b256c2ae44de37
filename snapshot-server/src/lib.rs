pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod registry;
pub mod repository;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
pub mod tls;

#[cfg(test)]
pub(crate) mod test_support;
