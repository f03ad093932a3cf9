use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "analysis-purge")]
#[command(about = "Purge the oldest analysis tasks when storage runs low", long_about = None)]
pub struct Cli {
    /// Working directory of the analysis platform
    #[arg(long, value_name = "DIR")]
    pub cwd: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Purge tasks according to the configuration (default)
    Run,
    /// Show available space, the configured reserve and the oldest task
    Status,
    /// Print configuration values
    PrintConfig,
}
