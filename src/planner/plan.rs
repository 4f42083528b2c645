//! Execution plans built from diffs.
//!
//! Deletes come first, then creates, then in-place updates. A replacement
//! becomes a delete followed by a create that depends on it.

use chrono::{DateTime, Utc};

use crate::config::DeployConfig;
use crate::resource::{DeclaredState, ResourceKind};

use super::diff::{DiffResult, DiffType};

/// A complete plan.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Declaration hash this plan is based on.
    pub config_hash: String,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Declared name.
    pub resource_name: String,
    /// Kind the action runs against.
    pub kind: ResourceKind,
    /// Declared state to create or update towards.
    pub desired: Option<DeclaredState>,
    /// Identifier of the entity being changed or removed.
    pub resource_id: Option<String>,
    /// The delete half of a replacement; the record is kept.
    pub replacing: bool,
    /// Reason for this action.
    pub reason: String,
    /// Declaration hash to record on success.
    pub new_hash: Option<String>,
    /// Indices of actions that must succeed first.
    pub dependencies: Vec<usize>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Create the entity.
    Create,
    /// Update the entity in place.
    Update,
    /// Delete the entity.
    Delete,
}

impl DeploymentPlan {
    /// Creates a plan from a diff result.
    #[must_use]
    pub fn from_diff(diff: &DiffResult, config: &DeployConfig, config_hash: &str) -> Self {
        let desired = |name: &str| config.resource(name).map(|r| r.declared_state());
        let mut actions = Vec::new();

        for d in diff.diffs.iter().filter(|d| d.diff_type == DiffType::Delete) {
            actions.push(PlannedAction {
                action_type: ActionType::Delete,
                resource_name: d.name.clone(),
                kind: d.kind,
                desired: None,
                resource_id: d.id.clone(),
                replacing: false,
                reason: String::from("removed from declarations"),
                new_hash: None,
                dependencies: vec![],
            });
        }

        for d in diff.diffs.iter().filter(|d| d.diff_type == DiffType::Create) {
            actions.push(PlannedAction {
                action_type: ActionType::Create,
                resource_name: d.name.clone(),
                kind: d.kind,
                desired: desired(&d.name),
                resource_id: None,
                replacing: false,
                reason: if d.old_hash.is_some() {
                    String::from("recorded entity no longer exists")
                } else {
                    String::from("declared")
                },
                new_hash: d.new_hash.clone(),
                dependencies: vec![],
            });
        }

        for d in diff.diffs.iter().filter(|d| d.diff_type == DiffType::Replace) {
            let fields: Vec<&str> = d
                .details
                .iter()
                .filter(|detail| detail.forces_new)
                .map(|detail| detail.field.as_str())
                .collect();
            let reason = format!("{} cannot change in place", fields.join(", "));

            let delete_idx = actions.len();
            actions.push(PlannedAction {
                action_type: ActionType::Delete,
                resource_name: d.name.clone(),
                kind: d.kind,
                desired: None,
                resource_id: d.id.clone(),
                replacing: true,
                reason: reason.clone(),
                new_hash: None,
                dependencies: vec![],
            });
            actions.push(PlannedAction {
                action_type: ActionType::Create,
                resource_name: d.name.clone(),
                kind: d.kind,
                desired: desired(&d.name),
                resource_id: None,
                replacing: true,
                reason,
                new_hash: d.new_hash.clone(),
                dependencies: vec![delete_idx],
            });
        }

        for d in diff.diffs.iter().filter(|d| d.diff_type == DiffType::Update) {
            let fields: Vec<&str> = d.details.iter().map(|detail| detail.field.as_str()).collect();
            actions.push(PlannedAction {
                action_type: ActionType::Update,
                resource_name: d.name.clone(),
                kind: d.kind,
                desired: desired(&d.name),
                resource_id: d.id.clone(),
                replacing: false,
                reason: format!("changed: {}", fields.join(", ")),
                new_hash: d.new_hash.clone(),
                dependencies: vec![],
            });
        }

        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions,
        }
    }

    /// Creates an empty plan.
    #[must_use]
    pub fn empty(config_hash: &str) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions: vec![],
        }
    }

    /// Returns true if the plan has no actions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of one type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions.iter().filter(|a| a.action_type == action_type).count()
    }

    /// Actions with no dependencies.
    #[must_use]
    pub fn ready_actions(&self) -> Vec<&PlannedAction> {
        self.actions
            .iter()
            .filter(|a| a.dependencies.is_empty())
            .collect()
    }

    /// Actions that depend on the action at `action_idx`.
    #[must_use]
    pub fn dependent_actions(&self, action_idx: usize) -> Vec<(usize, &PlannedAction)> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.dependencies.contains(&action_idx))
            .collect()
    }
}

impl PlannedAction {
    /// Human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        let id = self.resource_id.as_deref().map(|id| format!(" [{id}]")).unwrap_or_default();
        match self.action_type {
            ActionType::Create => format!("Create {} '{}'", self.kind, self.resource_name),
            ActionType::Update => format!("Update {} '{}'{id}", self.kind, self.resource_name),
            ActionType::Delete => format!("Delete {} '{}'{id}", self.kind, self.resource_name),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }
        Ok(())
    }
}
