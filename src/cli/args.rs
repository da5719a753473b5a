//! CLI argument definitions using clap
//!
//! Commands:
//! - qproc run --config <path> --catalog <path> --query <path>
//! - qproc explain --config <path> --catalog <path> --query <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// qproc - a memory-bounded, disk-spilling relational query processor
#[derive(Parser, Debug)]
#[command(name = "qproc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan and execute a query, printing the result as JSON lines
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./qproc.json")]
        config: PathBuf,

        /// Path to the catalog file (schemas and rows)
        #[arg(long)]
        catalog: PathBuf,

        /// Path to the query file
        #[arg(long)]
        query: PathBuf,

        /// Print execution counters to stderr when done
        #[arg(long)]
        stats: bool,

        /// Log lifecycle events at INFO
        #[arg(long)]
        verbose: bool,
    },

    /// Plan a query and print the chosen join tree
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./qproc.json")]
        config: PathBuf,

        /// Path to the catalog file (schemas and rows)
        #[arg(long)]
        catalog: PathBuf,

        /// Path to the query file
        #[arg(long)]
        query: PathBuf,

        /// Print the plan as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
