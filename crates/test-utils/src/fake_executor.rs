use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use planrunner::errors::Result;
use planrunner::exec::{AttemptContext, AttemptOutcome, TaskExecutor};

/// What a scripted task should do the Nth time it is attempted.
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    Succeed,
    Fail(i32),
    TimeOut,
    Sleep(std::time::Duration),
}

/// A fake [`TaskExecutor`] that never spawns a real process.
///
/// Each task id is scripted with a sequence of [`ScriptedAttempt`]s; the Nth
/// call to `run_attempt` for that task consumes the Nth scripted entry (the
/// last entry repeats if there are more attempts than scripted entries).
/// Every invocation is recorded in `executed` for assertions.
pub struct FakeExecutor {
    scripts: Mutex<BTreeMap<String, Vec<ScriptedAttempt>>>,
    executed: Arc<Mutex<Vec<(String, usize)>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(BTreeMap::new()),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(&self, task_id: &str, attempts: Vec<ScriptedAttempt>) {
        self.scripts.lock().unwrap().insert(task_id.to_string(), attempts);
    }

    pub fn executed(&self) -> Vec<(String, usize)> {
        self.executed.lock().unwrap().clone()
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutor for FakeExecutor {
    fn run_attempt<'a>(
        &'a self,
        ctx: AttemptContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptOutcome>> + Send + 'a>> {
        Box::pin(async move {
            self.executed
                .lock()
                .unwrap()
                .push((ctx.task.id.clone(), ctx.attempt_idx));

            let scripts = self.scripts.lock().unwrap();
            let script = scripts.get(&ctx.task.id);
            let step = script.and_then(|s| s.get(ctx.attempt_idx).or_else(|| s.last()));

            match step {
                None | Some(ScriptedAttempt::Succeed) => Ok(AttemptOutcome {
                    exit_code: Some(0),
                    timed_out: false,
                    canceled: false,
                    artifact_paths: Vec::new(),
                }),
                Some(ScriptedAttempt::Fail(code)) => Ok(AttemptOutcome {
                    exit_code: Some(*code),
                    timed_out: false,
                    canceled: false,
                    artifact_paths: Vec::new(),
                }),
                Some(ScriptedAttempt::TimeOut) => Ok(AttemptOutcome {
                    exit_code: None,
                    timed_out: true,
                    canceled: false,
                    artifact_paths: Vec::new(),
                }),
                Some(ScriptedAttempt::Sleep(d)) => {
                    let mut cancel_rx = ctx.cancel_rx.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(*d) => Ok(AttemptOutcome {
                            exit_code: Some(0),
                            timed_out: false,
                            canceled: false,
                            artifact_paths: Vec::new(),
                        }),
                        _ = async {
                            loop {
                                if *cancel_rx.borrow() { return; }
                                if cancel_rx.changed().await.is_err() { return; }
                            }
                        } => Ok(AttemptOutcome {
                            exit_code: None,
                            timed_out: false,
                            canceled: true,
                            artifact_paths: Vec::new(),
                        }),
                    }
                }
            }
        })
    }
}
