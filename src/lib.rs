//! dbvault - scheduled backups of a single database file
//!
//! Snapshots the primary data file, compresses it, uploads it to cloud
//! storage and prunes old copies on both sides.

pub mod backup;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod http_server;
pub mod policy;
pub mod scheduler;
pub mod service;
