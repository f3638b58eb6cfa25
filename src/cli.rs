// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `joindag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "joindag",
    version,
    about = "Run a task graph with bounded parallelism and merge parallel branches.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the graph file (TOML).
    ///
    /// Default: `Joindag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Joindag.toml")]
    pub graph: String,

    /// Override `[config].ceiling` (max tasks in flight).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub ceiling: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOINDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the graph, but don't execute any task.
    #[arg(long)]
    pub dry_run: bool,

    /// Append outcomes and merged results to this JSON-lines file.
    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,

    /// Session id recorded with every stored outcome (random if omitted).
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
