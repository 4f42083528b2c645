//! Plan execution.
//!
//! Every action runs through the per-instance driver of its kind; the
//! recorded state is updated after each action so a failed run still
//! records everything that did change remotely.

use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::driver::EntityDriver;
use crate::error::{ReconcileError, Result, ZitadelError};
use crate::resource::{DeclaredState, ResourceKind};
use crate::state::{DeploymentHistoryEntry, DeploymentOperation, DeploymentState};
use crate::zitadel::ProviderContext;

use super::plan::{ActionType, DeploymentPlan, PlannedAction};

/// Executor for plans.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    ctx: &'a ProviderContext,
    continue_on_error: bool,
    operation: DeploymentOperation,
}

/// How one action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    /// The action succeeded.
    Succeeded,
    /// The action failed.
    Failed {
        /// Rendered error.
        error: String,
    },
    /// A dependency failed, so the action did not run.
    Skipped,
}

/// Result of executing a single action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Action that was executed.
    pub action: PlannedAction,
    /// How it ended.
    pub status: ActionStatus,
    /// Identifier after the action, if the entity exists.
    pub resource_id: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Total actions attempted or skipped.
    pub total_executed: usize,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions.
    pub skipped: usize,
    /// Whether every attempted action succeeded.
    pub success: bool,
}

impl<'a> PlanExecutor<'a> {
    /// Creates an executor issuing calls through `ctx`.
    #[must_use]
    pub const fn new(ctx: &'a ProviderContext) -> Self {
        Self {
            ctx,
            continue_on_error: false,
            operation: DeploymentOperation::Apply,
        }
    }

    /// Sets the operation recorded in the history.
    #[must_use]
    pub const fn with_operation(mut self, operation: DeploymentOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Sets whether to keep going after a failed action.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes a plan against the recorded state.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Aborted`] if the run was cancelled. Action
    /// failures are reported in the result, not as an error.
    pub async fn execute(&self, plan: &DeploymentPlan, state: &mut DeploymentState) -> Result<ExecutionResult> {
        info!("Executing plan with {} actions", plan.actions.len());

        let mut results = Vec::with_capacity(plan.actions.len());
        let mut failed_indices: HashSet<usize> = HashSet::new();
        let mut cancelled = false;

        for (index, action) in plan.actions.iter().enumerate() {
            if action.dependencies.iter().any(|dep| failed_indices.contains(dep)) {
                warn!("Skipping action {index} due to failed dependencies");
                failed_indices.insert(index);
                results.push(ActionResult {
                    index,
                    action: action.clone(),
                    status: ActionStatus::Skipped,
                    resource_id: None,
                });
                continue;
            }

            info!("Executing action {index}: {}", action.description());
            let (status, resource_id) = match self.execute_action(action, state).await {
                Ok(id) => (ActionStatus::Succeeded, id),
                Err(e) => {
                    error!("{} failed: {e}", action.description());
                    cancelled = e.is_cancelled();
                    failed_indices.insert(index);
                    (ActionStatus::Failed { error: e.to_string() }, None)
                }
            };

            let failed = status != ActionStatus::Succeeded;
            results.push(ActionResult {
                index,
                action: action.clone(),
                status,
                resource_id,
            });

            if failed && (cancelled || !self.continue_on_error) {
                break;
            }
        }

        let execution_result = ExecutionResult::from_results(results);

        let resources = plan.actions.iter().map(|a| a.resource_name.clone()).collect();
        let entry = if execution_result.success {
            DeploymentHistoryEntry::new(self.operation, &plan.config_hash, resources)
        } else {
            DeploymentHistoryEntry::failed(
                self.operation,
                &plan.config_hash,
                resources,
                &format!("{} action(s) failed", execution_result.failed),
            )
        };
        state.add_history(entry);
        if execution_result.success {
            state.config_hash.clone_from(&plan.config_hash);
        }

        if cancelled {
            return Err(ReconcileError::Aborted {
                reason: format!("cancelled after {} action(s)", execution_result.successful),
            }
            .into());
        }

        Ok(execution_result)
    }

    /// Runs one action and returns the identifier the entity has afterwards.
    async fn execute_action(&self, action: &PlannedAction, state: &mut DeploymentState) -> Result<Option<String>> {
        let name = action.resource_name.as_str();
        let hash = action.new_hash.as_deref().unwrap_or_default();

        match action.action_type {
            ActionType::Delete => {
                let Some(record) = state.get(name).cloned() else {
                    return Ok(None);
                };

                let cleared = EntityDriver::for_kind(record.kind, self.ctx).destroy(&record.state).await?;
                if action.replacing {
                    state.update_state(name, cleared);
                } else {
                    state.remove(name);
                }
                Ok(None)
            }
            ActionType::Create => {
                let desired = Self::desired(action)?;
                let created = EntityDriver::for_kind(action.kind, self.ctx).create(desired).await;
                Self::record(state, name, action.kind, hash, created)
            }
            ActionType::Update => {
                let desired = Self::desired(action)?;
                let prior = state.get(name).map(|r| r.state.clone()).unwrap_or_default();
                let applied = EntityDriver::for_kind(action.kind, self.ctx).apply(&prior, desired).await;
                Self::record(state, name, action.kind, hash, applied)
            }
        }
    }

    fn desired(action: &PlannedAction) -> Result<&DeclaredState> {
        action.desired.as_ref().ok_or_else(|| {
            ZitadelError::internal(format!("{} has no declared state", action.description()))
        })
    }

    /// Records a driver outcome, including what a partial apply managed to record.
    fn record(
        state: &mut DeploymentState,
        name: &str,
        kind: ResourceKind,
        hash: &str,
        outcome: Result<DeclaredState>,
    ) -> Result<Option<String>> {
        match outcome {
            Ok(declared) => {
                let id = declared.id().to_string();
                state.record(name, kind, declared, hash);
                Ok(Some(id))
            }
            Err(ZitadelError::Reconcile(ReconcileError::PartialApply {
                kind: kind_name,
                id,
                field,
                reason,
                recorded,
            })) => {
                warn!("Recording partially applied {name} ({id}) so it is not orphaned");
                state.record(name, kind, (*recorded).clone(), hash);
                Err(ReconcileError::PartialApply {
                    kind: kind_name,
                    id,
                    field,
                    reason,
                    recorded,
                }
                .into())
            }
            Err(e) => Err(e),
        }
    }
}

impl ExecutionResult {
    fn from_results(results: Vec<ActionResult>) -> Self {
        let count = |pred: fn(&ActionStatus) -> bool| results.iter().filter(|r| pred(&r.status)).count();
        let successful = count(|s| *s == ActionStatus::Succeeded);
        let failed = count(|s| matches!(s, ActionStatus::Failed { .. }));
        let skipped = count(|s| *s == ActionStatus::Skipped);

        Self {
            total_executed: results.len(),
            successful,
            failed,
            skipped,
            success: failed == 0,
            results,
        }
    }

    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }

    /// Failed actions with their errors.
    #[must_use]
    pub fn failures(&self) -> Vec<(&PlannedAction, &str)> {
        self.results
            .iter()
            .filter_map(|r| match &r.status {
                ActionStatus::Failed { error } => Some((&r.action, error.as_str())),
                _ => None,
            })
            .collect()
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total_executed, self.successful, self.failed, self.skipped
        )
    }
}
