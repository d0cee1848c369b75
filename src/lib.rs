// src/lib.rs

pub mod cancel;
pub mod cli;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod paths;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod state;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::cli::{CancelArgs, Cli, Commands, LogStream, LogsArgs, ResumeArgs, RunArgs, StatusArgs};
use crate::dag::DagGraph;
use crate::errors::{PlanRunnerError, Result};
use crate::exec::RealTaskExecutor;
use crate::lock::{RunLock, DEFAULT_STALE_AFTER};
use crate::paths::RunPaths;
use crate::scheduler::{Engine, SchedulerCore, StartMode};
use crate::state::{RunState, RunStatus};

/// Exit code the process should use for the given run outcome (§6).
pub fn exit_code_for(status: RunStatus) -> i32 {
    match status {
        RunStatus::Success => 0,
        RunStatus::Canceled => 4,
        _ => 3,
    }
}

/// Top-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => run_plan(&cli.home, args).await,
        Commands::Resume(args) => resume_run(&cli.home, args).await,
        Commands::Status(args) => show_status(&cli.home, args),
        Commands::Logs(args) => show_logs(&cli.home, args),
        Commands::Cancel(args) => request_cancel(&cli.home, args),
    }
}

async fn run_plan(home: &Path, args: RunArgs) -> Result<i32> {
    let plan = plan::load_and_validate(&args.plan)?;
    let dag = DagGraph::build(&plan)?;

    if args.dry_run {
        for id in dag.topological_order() {
            println!("{id}");
        }
        return Ok(0);
    }

    let workdir = args
        .workdir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let run_id = paths::generate_run_id();
    let paths = RunPaths::new(home, &run_id);
    fs::create_dir_all(&paths.root)?;

    let _lock = RunLock::acquire(&paths, DEFAULT_STALE_AFTER)
        .map_err(|e| PlanRunnerError::Lock(format!("{e}")))?;

    let plan_source = fs::read_to_string(&args.plan)?;
    fs::write(paths.plan_file(), plan_source)?;

    let now = now_iso();
    let artifacts_dir = plan.artifacts_dir.as_ref().map(|d| resolve_dir(&workdir, d));

    let run_state = RunState {
        run_id: run_id.clone(),
        created_at: now.clone(),
        updated_at: now,
        status: RunStatus::Running,
        goal: plan.goal.clone(),
        plan_relpath: "plan.yaml".to_string(),
        home: home.display().to_string(),
        workdir: workdir.display().to_string(),
        max_parallel: args.max_parallel,
        fail_fast: args.effective_fail_fast(),
        tasks: SchedulerCore::fresh_tasks(&plan),
    };

    info!(run_id = %run_id, "run started");

    let executor = Arc::new(RealTaskExecutor);
    let engine = Engine::new(
        plan,
        dag,
        run_state,
        StartMode::Fresh,
        paths.clone(),
        executor,
        workdir,
        artifacts_dir,
    );

    let final_state = engine.run().await?;
    report::write(&paths, &final_state)?;

    println!("{}", run_id);
    Ok(exit_code_for(final_state.status))
}

async fn resume_run(home: &Path, args: ResumeArgs) -> Result<i32> {
    let paths = RunPaths::new(home, &args.run_id);
    if !paths.root.exists() {
        return Err(PlanRunnerError::State(format!(
            "no run directory for run_id '{}'",
            args.run_id
        )));
    }

    let _lock = RunLock::acquire(&paths, DEFAULT_STALE_AFTER)
        .map_err(|e| PlanRunnerError::Lock(format!("{e}")))?;

    // Resuming explicitly supersedes a previous cancellation request.
    cancel::clear_cancel(&paths)?;

    let plan = plan::load_and_validate(paths.plan_file())?;
    let dag = DagGraph::build(&plan)?;
    let mut run_state = state::load(&paths)?;
    run_state.max_parallel = args.max_parallel;

    let workdir = PathBuf::from(&run_state.workdir);
    let artifacts_dir = plan.artifacts_dir.as_ref().map(|d| resolve_dir(&workdir, d));

    info!(run_id = %args.run_id, failed_only = args.failed_only, "resuming run");

    let executor = Arc::new(RealTaskExecutor);
    let engine = Engine::new(
        plan,
        dag,
        run_state,
        StartMode::Resume {
            failed_only: args.failed_only,
        },
        paths.clone(),
        executor,
        workdir,
        artifacts_dir,
    );

    let final_state = engine.run().await?;
    report::write(&paths, &final_state)?;

    Ok(exit_code_for(final_state.status))
}

fn show_status(home: &Path, args: StatusArgs) -> Result<i32> {
    let paths = RunPaths::new(home, &args.run_id);
    let _lock = RunLock::try_acquire_best_effort(&paths, 3, std::time::Duration::from_millis(100));
    if _lock.is_none() {
        warn!(run_id = %args.run_id, "could not acquire run lock; showing a possibly-stale view");
    }

    let state = state::load(&paths)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(0);
    }

    println!("run {}  status={:?}  goal={}", state.run_id, state.status, state.goal);
    println!("{:<24} {:<10} {:>8} {:>10} {:>6}", "task", "status", "attempts", "duration", "exit");
    for (id, task) in &state.tasks {
        let duration = task.duration_sec.map(|d| format!("{d:.2}")).unwrap_or_else(|| "-".into());
        let exit_code = task.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<24} {:<10} {:>8} {:>10} {:>6}",
            id,
            format!("{:?}", task.status),
            task.attempts,
            duration,
            exit_code,
        );
    }

    Ok(0)
}

fn show_logs(home: &Path, args: LogsArgs) -> Result<i32> {
    let paths = RunPaths::new(home, &args.run_id);
    let _lock = RunLock::try_acquire_best_effort(&paths, 3, std::time::Duration::from_millis(100));

    if matches!(args.stream, LogStream::Out | LogStream::Both) {
        println!("=== {} stdout ===", args.task);
        for line in paths::tail_lines(&paths.stdout_log(&args.task), args.tail)? {
            println!("{line}");
        }
    }
    if matches!(args.stream, LogStream::Err | LogStream::Both) {
        println!("=== {} stderr ===", args.task);
        for line in paths::tail_lines(&paths.stderr_log(&args.task), args.tail)? {
            println!("{line}");
        }
    }

    Ok(0)
}

fn request_cancel(home: &Path, args: CancelArgs) -> Result<i32> {
    let paths = RunPaths::new(home, &args.run_id);
    if !paths.root.exists() {
        return Err(PlanRunnerError::State(format!(
            "no run directory for run_id '{}'",
            args.run_id
        )));
    }
    cancel::request_cancel(&paths)?;
    info!(run_id = %args.run_id, "cancellation requested");
    Ok(0)
}

fn resolve_dir(workdir: &Path, dir: &str) -> PathBuf {
    let p = Path::new(dir);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        workdir.join(p)
    }
}

fn now_iso() -> String {
    Local::now().to_rfc3339()
}
