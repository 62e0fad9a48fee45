//! CLI module for dbvault
//!
//! Provides command-line interface for:
//! - serve: Run the scheduler and HTTP API
//! - backup: One manual backup
//! - status: Print backup status
//! - setup: Credential diagnostics and template

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, SetupAction};
pub use commands::{
    backup, run, run_command, serve, setup_check, setup_report, setup_template, status,
    write_template, SetupReport,
};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response};
