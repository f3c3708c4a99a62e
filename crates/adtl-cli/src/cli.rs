//! CLI argument definitions for `adtl`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use tracing::level_filters::LevelFilter;

use adtl_cli::logging::LogFormat;

#[derive(Parser)]
#[command(
    name = "adtl",
    version,
    about = "Transform tabular source data into normalized tables using an adtl specification",
    long_about = "Transform tabular source data into normalized tables.\n\n\
                  A specification file (JSON or TOML) declares the output tables and\n\
                  how each attribute is computed from the columns of a source CSV file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse a CSV file with a specification and write one CSV per table.
    Parse(ParseArgs),

    /// Compare the fields a specification reads against a CSV header.
    Check(CheckArgs),
}

#[derive(Parser)]
pub struct ParseArgs {
    /// Specification file (.json or .toml).
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Source data file (CSV with a header row).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Output directory for the table files (default: current directory).
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Extra definitions files, merged after the specification's own.
    #[arg(long = "include-def", value_name = "FILE")]
    pub include_def: Vec<PathBuf>,

    /// Validate and report without writing output files.
    #[arg(long = "validate-only")]
    pub validate_only: bool,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Specification file (.json or .toml).
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Source data file whose header is checked.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Extra definitions files, merged after the specification's own.
    #[arg(long = "include-def", value_name = "FILE")]
    pub include_def: Vec<PathBuf>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => Self::ERROR,
            LogLevelArg::Warn => Self::WARN,
            LogLevelArg::Info => Self::INFO,
            LogLevelArg::Debug => Self::DEBUG,
            LogLevelArg::Trace => Self::TRACE,
        }
    }
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Json => Self::Json,
        }
    }
}
