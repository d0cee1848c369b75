// src/exec/supervisor.rs

//! [`RealTaskExecutor`]: the production [`TaskExecutor`] that spawns the
//! task's `argv` directly (never through a shell), streams its output to
//! per-task log files, and enforces timeout/cancellation via graceful
//! termination before a forceful kill.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use globset::{Glob, GlobSetBuilder};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{PlanRunnerError, Result};
use crate::exec::executor::{resolve_cwd, AttemptContext, AttemptOutcome, TaskExecutor};

/// Grace period between SIGTERM and SIGKILL when a child must be stopped.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Bounded read buffer for copying a child's stdout/stderr pipe to its log
/// file; the process's own output is never buffered in full.
const COPY_CHUNK: usize = 8 * 1024;

pub struct RealTaskExecutor;

impl TaskExecutor for RealTaskExecutor {
    fn run_attempt<'a>(
        &'a self,
        ctx: AttemptContext<'a>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<AttemptOutcome>> + Send + 'a>>
    {
        Box::pin(run_attempt(ctx))
    }
}

async fn run_attempt(mut ctx: AttemptContext<'_>) -> Result<AttemptOutcome> {
    let task = ctx.task;
    let cwd = resolve_cwd(task, ctx.default_workdir);
    fs::create_dir_all(&cwd).await?;
    fs::create_dir_all(ctx.run_paths.logs_dir()).await?;

    let mut out_file = append_with_separator(
        &ctx.run_paths.stdout_log(&task.id),
        ctx.attempt_idx,
        ctx.max_attempts,
    )
    .await?;
    let mut err_file = append_with_separator(
        &ctx.run_paths.stderr_log(&task.id),
        ctx.attempt_idx,
        ctx.max_attempts,
    )
    .await?;

    let mut command = Command::new(&task.argv[0]);
    command
        .args(&task.argv[1..])
        .current_dir(&cwd)
        .envs(&task.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        PlanRunnerError::Other(anyhow::anyhow!(
            "spawning task '{}' ({}): {e}",
            task.id,
            task.argv[0]
        ))
    })?;

    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");

    let out_copy = copy_stream(stdout, &mut out_file);
    let err_copy = copy_stream(stderr, &mut err_file);
    let (out_res, err_res) = tokio::join!(out_copy, err_copy);
    if let Err(e) = out_res {
        warn!(task = %task.id, error = %e, "stdout capture failed");
    }
    if let Err(e) = err_res {
        warn!(task = %task.id, error = %e, "stderr capture failed");
    }

    let outcome = wait_for_exit(&mut child, &mut ctx).await?;

    let artifact_paths = if !task.outputs.is_empty() {
        collect_artifacts(task, &cwd, ctx.run_paths, ctx.artifacts_dir)
            .await
            .unwrap_or_else(|e| {
                warn!(task = %task.id, error = %e, "artifact collection failed");
                Vec::new()
            })
    } else {
        Vec::new()
    };

    Ok(AttemptOutcome {
        artifact_paths,
        ..outcome
    })
}

/// Append the `===== attempt N / M =====` separator, returning the file
/// positioned at EOF for the caller to write the attempt's output after it.
async fn append_with_separator(path: &Path, attempt_idx: usize, max_attempts: u32) -> Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let line = format!("===== attempt {} / {} =====\n", attempt_idx + 1, max_attempts);
    file.write_all(line.as_bytes()).await?;
    Ok(file)
}

async fn copy_stream(mut src: impl tokio::io::AsyncRead + Unpin, dst: &mut File) -> std::io::Result<()> {
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
    }
    dst.flush().await
}

/// Wait for the child to exit, respecting the task's timeout and the shared
/// cancellation signal. On either timeout or cancellation, escalate from
/// SIGTERM to SIGKILL.
async fn wait_for_exit(child: &mut Child, ctx: &mut AttemptContext<'_>) -> Result<AttemptOutcome> {
    let wait_fut = child.wait();

    let raced = async {
        tokio::select! {
            biased;
            status = wait_fut => RaceResult::Exited(status),
            _ = wait_for_cancel(&mut ctx.cancel_rx) => RaceResult::Canceled,
        }
    };

    let raced = match ctx.task.timeout_sec {
        Some(secs) if secs > 0.0 => match timeout(Duration::from_secs_f64(secs), raced).await {
            Ok(r) => r,
            Err(_) => RaceResult::TimedOut,
        },
        _ => raced.await,
    };

    match raced {
        RaceResult::Exited(status) => {
            let status = status.map_err(|e| {
                PlanRunnerError::Other(anyhow::anyhow!(
                    "waiting for task '{}': {e}",
                    ctx.task.id
                ))
            })?;
            Ok(AttemptOutcome {
                exit_code: status.code(),
                timed_out: false,
                canceled: false,
                artifact_paths: Vec::new(),
            })
        }
        RaceResult::TimedOut => {
            terminate(child, &ctx.task.id).await;
            let status = child.wait().await.ok();
            Ok(AttemptOutcome {
                exit_code: status.and_then(|s| s.code()),
                timed_out: true,
                canceled: false,
                artifact_paths: Vec::new(),
            })
        }
        RaceResult::Canceled => {
            terminate(child, &ctx.task.id).await;
            let status = child.wait().await.ok();
            Ok(AttemptOutcome {
                exit_code: status.and_then(|s| s.code()),
                timed_out: false,
                canceled: true,
                artifact_paths: Vec::new(),
            })
        }
    }
}

enum RaceResult {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Canceled,
}

async fn wait_for_cancel(rx: &mut tokio::sync::watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    // Sender dropped without ever canceling: never resolves as canceled.
    std::future::pending::<()>().await;
}

/// Send SIGTERM, wait a grace period, then SIGKILL if the child is still
/// alive. `try_wait` doubles as the liveness check so we never block past
/// the grace period.
async fn terminate(child: &mut Child, task_id: &str) {
    if let Some(pid) = child.id() {
        debug!(task = task_id, pid, "sending SIGTERM");
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    let grace = tokio::time::sleep(TERM_GRACE);
    tokio::pin!(grace);
    tokio::select! {
        _ = child.wait() => return,
        _ = &mut grace => {}
    }

    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            warn!(task = task_id, "SIGTERM grace period elapsed; sending SIGKILL");
            let _ = child.start_kill();
        }
    }
}

/// Glob-match `task.outputs` against files under `cwd`, copying matches into
/// `artifacts/<task_id>/` (and the plan's `artifacts_dir`, if configured).
/// Best-effort: individual copy failures are skipped rather than aborting
/// the whole collection pass.
async fn collect_artifacts(
    task: &crate::plan::TaskSpec,
    cwd: &Path,
    run_paths: &crate::paths::RunPaths,
    plan_artifacts_dir: Option<&Path>,
) -> Result<Vec<String>> {
    let mut builder = GlobSetBuilder::new();
    for pattern in &task.outputs {
        builder.add(Glob::new(pattern).map_err(|e| {
            PlanRunnerError::Plan(format!("task '{}' has invalid output glob '{pattern}': {e}", task.id))
        })?);
    }
    let set = builder.build().map_err(|e| PlanRunnerError::Other(e.into()))?;

    let mut matches = Vec::new();
    walk(cwd, cwd, &set, &mut matches).await?;

    let dest_dir = run_paths.task_artifacts_dir(&task.id);
    fs::create_dir_all(&dest_dir).await?;

    let mut collected = Vec::new();
    for rel in &matches {
        let src = cwd.join(rel);
        let dest = dest_dir.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::copy(&src, &dest).await.is_err() {
            continue;
        }
        if let Some(plan_dir) = plan_artifacts_dir {
            let plan_dest = plan_dir.join(rel);
            if let Some(parent) = plan_dest.parent() {
                let _ = fs::create_dir_all(parent).await;
            }
            let _ = fs::copy(&src, &plan_dest).await;
        }
        collected.push(rel.to_string_lossy().replace('\\', "/"));
    }

    Ok(collected)
}

fn walk<'a>(
    root: &'a Path,
    dir: &'a Path,
    set: &'a globset::GlobSet,
    out: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => return Ok(()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                walk(root, &path, set, out).await?;
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(root) {
                    if set.is_match(rel) {
                        out.push(rel.to_path_buf());
                    }
                }
            }
        }
        Ok(())
    })
}
