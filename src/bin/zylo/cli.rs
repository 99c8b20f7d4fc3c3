//! # Cli
//!
//! This module contains everything needed for parsing the CLI arguments for
//! the Zylo toolchain.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Struct containing the CLI configuration for Zylo.
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Specify the log level of the toolchain.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

/// Enum for specifying the log level of Zylo.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// The default log level. Only critical errors will be logged.
    #[default]
    #[value(alias("0"))]
    Error,

    /// A log level where warnings are logged as well.
    #[value(alias("1"))]
    Warn,

    /// Also log information about the general state of the toolchain.
    #[value(alias("2"))]
    Info,

    /// Log everything which happens internally in the pipeline.
    #[value(alias("3"))]
    Debug,

    /// Log extra information, including per-stage details.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a Zylo source file through the tree-walking evaluator.
    Run(RunArgs),

    /// Parse and analyse a source file without executing it.
    Check(RunArgs),

    /// Translate a source file into an equivalent Rust program.
    Build(BuildArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The path to the Zylo source file.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// Whether to dump the parsed AST as JSON (for debugging).
    #[arg(long)]
    pub dump_parsed: bool,

    /// Whether to dump the analysed symbol table as JSON (for debugging).
    #[arg(long)]
    pub dump_typed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// The path to the Zylo source file.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// The path of the emitted Rust source file.
    #[arg(short, long)]
    pub output: std::path::PathBuf,

    /// Whether to dump the parsed AST as JSON (for debugging).
    #[arg(long)]
    pub dump_parsed: bool,
}
