//! CLI argument definitions using clap
//!
//! Commands:
//! - dbvault serve --config <path>
//! - dbvault backup --config <path>
//! - dbvault status --config <path>
//! - dbvault setup check|template --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dbvault - scheduled local and cloud backups of the inventory database
#[derive(Parser, Debug)]
#[command(name = "dbvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the scheduler and the HTTP API
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./dbvault.json")]
        config: PathBuf,
    },

    /// Run one backup now and print the result
    Backup {
        /// Path to configuration file
        #[arg(long, default_value = "./dbvault.json")]
        config: PathBuf,
    },

    /// Print backup status
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./dbvault.json")]
        config: PathBuf,
    },

    /// Cloud credential setup helpers
    Setup {
        #[command(subcommand)]
        action: SetupAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SetupAction {
    /// Report credential, policy and backup directory state
    Check {
        #[arg(long, default_value = "./dbvault.json")]
        config: PathBuf,
    },

    /// Write a credential template if none exists
    Template {
        #[arg(long, default_value = "./dbvault.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
