//! Command-line interface for geofeed.
//!
//! This module provides the CLI structure and output helpers for the
//! `geofeed` binary.

mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, ConfigCommand, ListCommand, OutputFormat, RateCommand, ReportArg, ShowCommand,
    StatusCommand,
};

/// geofeed - Browse, like, rate and share geotagged reports
///
/// Works against a local report database; every change is written back and
/// the feed is re-read afterwards.
#[derive(Debug, Parser)]
#[command(name = "geofeed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Act as this user (overrides `identity.user`)
    #[arg(short, long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the feed, newest first
    List(ListCommand),

    /// Show one report
    Show(ShowCommand),

    /// Add a new report
    Add(AddCommand),

    /// Like a report
    Like(ReportArg),

    /// Remove your like from a report
    Unlike(ReportArg),

    /// Rate a report (once per user)
    Rate(RateCommand),

    /// Share a report's image
    Share(ReportArg),

    /// Show database and feed statistics
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
