// src/scheduler/engine.rs

//! Async IO shell around [`SchedulerCore`].
//!
//! This owns the channels, the cancel-poll timer, and the per-task attempt
//! futures; all scheduling *decisions* live in `core.rs`. Mirrors the
//! pure-core/async-shell split used elsewhere in this codebase for DAG
//! execution, generalized to retries, timeouts, and durable resume.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::core::{self, AttemptReport, Command, SchedulerCore};
use crate::cancel;
use crate::dag::DagGraph;
use crate::errors::Result;
use crate::exec::{AttemptContext, TaskExecutor};
use crate::paths::RunPaths;
use crate::plan::PlanSpec;
use crate::state::{self, RunState, RunStatus};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub enum StartMode {
    Fresh,
    Resume { failed_only: bool },
}

pub struct Engine<E: TaskExecutor + 'static> {
    core: SchedulerCore,
    plan: PlanSpec,
    run_state: RunState,
    paths: RunPaths,
    executor: Arc<E>,
    default_workdir: PathBuf,
    artifacts_dir: Option<PathBuf>,
    cancel_tx: watch::Sender<bool>,
}

impl<E: TaskExecutor + 'static> Engine<E> {
    pub fn new(
        plan: PlanSpec,
        dag: DagGraph,
        mut run_state: RunState,
        mode: StartMode,
        paths: RunPaths,
        executor: Arc<E>,
        default_workdir: PathBuf,
        artifacts_dir: Option<PathBuf>,
    ) -> Self {
        let mut core = SchedulerCore::new(
            plan.clone(),
            dag,
            run_state.max_parallel,
            run_state.fail_fast,
        );
        if let StartMode::Resume { failed_only } = mode {
            core.apply_resume(&mut run_state.tasks, failed_only);
        }

        let (cancel_tx, _) = watch::channel(false);

        Self {
            core,
            plan,
            run_state,
            paths,
            executor,
            default_workdir,
            artifacts_dir,
            cancel_tx,
        }
    }

    /// Drive the run to completion, returning the final [`RunState`].
    pub async fn run(mut self) -> Result<RunState> {
        info!(run_id = %self.run_state.run_id, "scheduler starting");

        let (event_tx, mut event_rx) = mpsc::channel::<core::Event>(EVENT_CHANNEL_CAPACITY);

        let commands = self.core.start(&mut self.run_state.tasks);
        self.execute(commands, &event_tx);

        if !self.core.all_terminal(&self.run_state.tasks) {
            let mut cancel_poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
            cancel_poll.tick().await; // first tick fires immediately; consume it

            loop {
                tokio::select! {
                    biased;

                    _ = cancel_poll.tick() => {
                        if cancel::is_cancel_requested(&self.paths) {
                            let commands = self.core.step(&mut self.run_state.tasks, core::Event::CancelObserved);
                            self.execute(commands, &event_tx);
                        }
                    }

                    maybe_event = event_rx.recv() => {
                        let Some(event) = maybe_event else {
                            warn!("event channel closed with run still active");
                            break;
                        };
                        let commands = self.core.step(&mut self.run_state.tasks, event);
                        self.execute(commands, &event_tx);
                    }
                }

                if self.core.all_terminal(&self.run_state.tasks) {
                    break;
                }
            }
        }

        self.finish()?;
        Ok(self.run_state)
    }

    fn execute(&mut self, commands: Vec<Command>, event_tx: &mpsc::Sender<core::Event>) {
        for command in commands {
            match command {
                Command::Persist => {
                    self.run_state.updated_at = now_iso();
                    if let Err(e) = state::save(&self.paths, &self.run_state) {
                        warn!(error = %e, "failed to persist run state");
                    }
                }
                Command::BroadcastCancel => {
                    let _ = self.cancel_tx.send(true);
                }
                Command::Finish => {}
                Command::RunAttempt {
                    id,
                    attempt_idx,
                    delay_sec,
                } => {
                    self.spawn_attempt(id, attempt_idx, delay_sec, event_tx.clone());
                }
            }
        }
    }

    fn spawn_attempt(
        &self,
        id: String,
        attempt_idx: usize,
        delay_sec: f64,
        event_tx: mpsc::Sender<core::Event>,
    ) {
        let executor = Arc::clone(&self.executor);
        let paths = self.paths.clone();
        let default_workdir = self.default_workdir.clone();
        let artifacts_dir = self.artifacts_dir.clone();
        let task = self
            .plan
            .task(&id)
            .cloned()
            .expect("dispatched task id exists in the plan");
        let max_attempts = task.max_attempts();
        let cancel_rx = self.cancel_tx.subscribe();

        tokio::spawn(async move {
            if delay_sec > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(delay_sec)).await;
            }

            debug!(task = %id, attempt = attempt_idx + 1, max_attempts, "running attempt");
            let started = Instant::now();

            let ctx = AttemptContext {
                task: &task,
                run_paths: &paths,
                attempt_idx,
                max_attempts,
                default_workdir: &default_workdir,
                artifacts_dir: artifacts_dir.as_deref(),
                cancel_rx,
            };

            let outcome = match executor.run_attempt(ctx).await {
                Ok(outcome) => AttemptReport {
                    exit_code: outcome.exit_code,
                    timed_out: outcome.timed_out,
                    canceled: outcome.canceled,
                    artifact_paths: outcome.artifact_paths,
                    duration_sec: started.elapsed().as_secs_f64(),
                },
                Err(e) => {
                    warn!(task = %id, error = %e, "supervisor error; recording attempt as failed");
                    AttemptReport {
                        exit_code: None,
                        timed_out: false,
                        canceled: false,
                        artifact_paths: Vec::new(),
                        duration_sec: started.elapsed().as_secs_f64(),
                    }
                }
            };

            let _ = event_tx
                .send(core::Event::AttemptFinished {
                    id,
                    attempt_idx,
                    outcome,
                })
                .await;
        });
    }

    fn finish(&mut self) -> Result<()> {
        let status = self.core.final_run_status(&self.run_state.tasks);
        self.run_state.status = status;
        self.run_state.updated_at = now_iso();
        state::save(&self.paths, &self.run_state)?;
        info!(run_id = %self.run_state.run_id, status = ?status_label(status), "scheduler finished");
        Ok(())
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
        RunStatus::Canceled => "canceled",
    }
}

fn now_iso() -> String {
    Local::now().to_rfc3339()
}
