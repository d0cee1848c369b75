// src/scheduler/mod.rs

pub mod core;
pub mod engine;

pub use core::{AttemptReport, Command, Event, SchedulerCore};
pub use engine::{Engine, StartMode};
