#![allow(dead_code)]

use planrunner::plan::{EnvMap, PlanSpec, TaskSpec};

/// Builder for [`PlanSpec`] to simplify test setup.
pub struct PlanSpecBuilder {
    goal: String,
    artifacts_dir: Option<String>,
    tasks: Vec<TaskSpec>,
}

impl PlanSpecBuilder {
    pub fn new(goal: &str) -> Self {
        Self {
            goal: goal.to_string(),
            artifacts_dir: None,
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_artifacts_dir(mut self, dir: &str) -> Self {
        self.artifacts_dir = Some(dir.to_string());
        self
    }

    pub fn build(self) -> PlanSpec {
        PlanSpec {
            goal: self.goal,
            artifacts_dir: self.artifacts_dir,
            tasks: self.tasks,
        }
    }
}

/// Builder for [`TaskSpec`].
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(id: &str, argv: &[&str]) -> Self {
        Self {
            task: TaskSpec {
                id: id.to_string(),
                argv: argv.iter().map(|s| s.to_string()).collect(),
                depends_on: Vec::new(),
                cwd: None,
                env: EnvMap::new(),
                timeout_sec: None,
                retries: 0,
                retry_backoff_sec: Vec::new(),
                outputs: Vec::new(),
            },
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn cwd(mut self, cwd: &str) -> Self {
        self.task.cwd = Some(cwd.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn timeout_sec(mut self, secs: f64) -> Self {
        self.task.timeout_sec = Some(secs);
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.task.retries = n;
        self
    }

    pub fn retry_backoff_sec(mut self, backoff: &[f64]) -> Self {
        self.task.retry_backoff_sec = backoff.to_vec();
        self
    }

    pub fn outputs(mut self, globs: &[&str]) -> Self {
        self.task.outputs = globs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}
