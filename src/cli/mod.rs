//! CLI module for qproc
//!
//! Provides command-line interface for:
//! - run: plan and execute a query from JSON catalog and query files
//! - explain: print the join tree the optimizer chooses

mod args;
mod commands;
mod errors;
mod files;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use files::{CatalogFile, QueryFile};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}
