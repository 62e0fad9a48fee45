//! # HTTP Server Module
//!
//! HTTP API over the backup service.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/backup/*` - Status, policy, cloud authorization and artifact inventory

pub mod backup_routes;
pub mod config;
pub mod server;

pub use config::HttpServerConfig;
pub use server::HttpServer;
