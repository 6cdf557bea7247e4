//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Dredge - asynchronous research task orchestration daemon
#[derive(Debug, Parser)]
#[command(name = "dredge", version, about)]
pub struct Cli {
    /// Path to a configuration file (overrides the lookup chain)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the tool protocol server in the foreground
    Serve {
        /// Socket path override
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Database path override
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,

    /// Print a tool's input/output schemas
    Schema {
        /// Tool name
        tool: String,
    },
}
