// src/exec/mod.rs

pub mod executor;
pub mod supervisor;

pub use executor::{resolve_cwd, AttemptContext, AttemptOutcome, TaskExecutor};
pub use supervisor::RealTaskExecutor;
