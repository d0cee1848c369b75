// src/plan/loader.rs

use std::fs;
use std::path::Path;

use crate::errors::PlanRunnerError;
use crate::plan::model::{PlanSpec, RawPlanSpec};
use crate::plan::validate::validate_and_normalize;

/// Parse a plan YAML document without running any validation.
pub fn parse_str(contents: &str) -> Result<RawPlanSpec, PlanRunnerError> {
    serde_yaml::from_str(contents)
        .map_err(|e| PlanRunnerError::Plan(format!("invalid plan YAML: {e}")))
}

/// Load a plan file from disk, parse it, and run full structural validation
/// (uniqueness, reference integrity, id shape, argv/timeout/retry shape).
///
/// Acyclicity is checked separately by the DAG builder, since constructing
/// the plan's DAG is required downstream regardless.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanSpec, PlanRunnerError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| PlanRunnerError::Plan(format!("reading plan file {path:?}: {e}")))?;

    let raw = parse_str(&contents)?;
    validate_and_normalize(raw)
}
