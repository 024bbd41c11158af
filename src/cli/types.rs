//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{rollback::RollbackArgs, run::RunArgs, status::StatusArgs};

#[derive(Parser)]
#[command(name = "fixloop")]
#[command(about = "Fixloop - bounded bug-resolution scheduler", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .fixloop/config.yaml + .fixloop/local.yaml)
    #[arg(short, long, global = true, env = "FIXLOOP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Schedule a backlog of bugs through reproduce, patch and verify
    Run(RunArgs),

    /// Show the status recorded by the last run
    Status(StatusArgs),

    /// Revert the last applied patch for a bug
    Rollback(RollbackArgs),
}
