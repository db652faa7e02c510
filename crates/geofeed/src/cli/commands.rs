//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Report identifier
    pub id: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Add command arguments.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Display address of the reported location
    #[arg(short, long)]
    pub address: String,

    /// Image reference (URI or storage path)
    #[arg(short, long)]
    pub image: String,

    /// Creation time in seconds since the Unix epoch (defaults to now)
    #[arg(short, long)]
    pub timestamp: Option<i64>,

    /// Report identifier (derived from the other fields if omitted)
    #[arg(long)]
    pub id: Option<String>,
}

/// Arguments naming a single report.
#[derive(Debug, Args)]
pub struct ReportArg {
    /// Report identifier
    pub id: String,
}

/// Rate command arguments.
#[derive(Debug, Args)]
pub struct RateCommand {
    /// Report identifier
    pub id: String,

    /// Star value between 0 and 5
    pub stars: f64,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
