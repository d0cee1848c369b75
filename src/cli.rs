// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `planrunner`.
#[derive(Debug, Parser)]
#[command(
    name = "planrunner",
    version,
    about = "Execute a DAG of CLI tasks with retries, timeouts, and durable resume.",
    long_about = None
)]
pub struct Cli {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PLANRUNNER_LOG` or a default level is used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Root directory under which run directories live.
    #[arg(long, value_name = "DIR", default_value = ".planrunner", global = true)]
    pub home: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate and execute a plan.
    Run(RunArgs),
    /// Resume a previously started run.
    Resume(ResumeArgs),
    /// Print the current state of a run.
    Status(StatusArgs),
    /// Print the tail of a task's log.
    Logs(LogsArgs),
    /// Request cancellation of an in-progress run.
    Cancel(CancelArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Path to the plan file (YAML).
    pub plan: PathBuf,

    /// Maximum number of tasks RUNNING simultaneously.
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub max_parallel: usize,

    /// Default working directory for tasks that don't set their own `cwd`.
    ///
    /// Defaults to the current directory.
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Stop admitting new tasks after the first failure (default).
    #[arg(long)]
    pub fail_fast: bool,

    /// Let independent branches keep running after a failure elsewhere.
    #[arg(long = "no-fail-fast")]
    pub no_fail_fast: bool,

    /// Validate the plan and print its topological order without executing it.
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub fn effective_fail_fast(&self) -> bool {
        !self.no_fail_fast
    }
}

#[derive(Debug, clap::Args)]
pub struct ResumeArgs {
    /// Run id to resume, as printed by `run`.
    pub run_id: String,

    /// Maximum number of tasks RUNNING simultaneously.
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub max_parallel: usize,

    /// Only re-eligible previously-FAILED tasks (and what they block); leave
    /// CANCELED tasks as CANCELED.
    #[arg(long)]
    pub failed_only: bool,
}

#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    pub run_id: String,

    /// Print the state snapshot as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct LogsArgs {
    pub run_id: String,

    /// Task id whose log to print.
    #[arg(long = "task", value_name = "ID")]
    pub task: String,

    /// Number of trailing lines to print.
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub tail: usize,

    /// Which stream(s) to print.
    #[arg(long, value_enum, default_value_t = LogStream::Both)]
    pub stream: LogStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogStream {
    Out,
    Err,
    Both,
}

#[derive(Debug, clap::Args)]
pub struct CancelArgs {
    pub run_id: String,
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

/// Convenience wrapper around `Cli::parse()`.
pub fn parse() -> Cli {
    Cli::parse()
}
