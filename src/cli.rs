//! Command-line arguments.

use clap::{Parser, Subcommand, ValueEnum};

/// Database connectivity probe and remote image allowlist checker.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty, global = true)]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable, compact output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Subcommand)]
pub enum Command {
    /// Run `SELECT 1` against the configured database and exit.
    #[default]
    Probe,
    /// Check whether a remote image URL is admitted by the allowlist.
    Image {
        /// Absolute URL of the image.
        url: String,
    },
    /// Print the configured remote image patterns.
    Patterns,
}
