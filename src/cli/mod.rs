//! CLI interface for optrack
//!
//! Provides subcommands for:
//! - `run`: Start the ingestion core
//! - `symbols`: Resolve and print the current option catalog
//! - `config`: Show the effective configuration

mod run;
mod symbols;

pub use run::RunArgs;
pub use symbols::SymbolsArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "optrack")]
#[command(about = "Options ticker ingestion core for Bybit")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the ingestion core
    Run(RunArgs),
    /// Resolve and print the current option catalog
    Symbols(SymbolsArgs),
    /// Show the effective configuration
    Config,
}
