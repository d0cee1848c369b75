// src/plan/mod.rs

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::load_and_validate;
pub use model::{EnvMap, PlanSpec, RawCmd, RawPlanSpec, RawTaskSpec, TaskSpec};
