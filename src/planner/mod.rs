//! Planning module for reconcile runs.
//!
//! This module compares the declaration file with the recorded state,
//! turns the differences into an ordered plan and executes it through the
//! entity drivers.

mod diff;
mod executor;
mod plan;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff, SENSITIVE};
pub use executor::{ActionResult, ActionStatus, ExecutionResult, PlanExecutor};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
