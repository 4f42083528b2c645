//! Diff engine for comparing declarations against recorded state.
//!
//! Each declared instance is compared field by field with its recorded
//! state using the kind's surface: computed-only fields are ignored,
//! unset optional fields equal their zero value, and a changed
//! immutable-on-create field turns an update into a replacement.

use std::collections::HashSet;
use tracing::debug;

use crate::config::{ConfigHasher, DeployConfig, ResourceConfig};
use crate::driver::{classify, ApplyAction};
use crate::resource::{AttrValue, DeclaredState, ResourceKind};
use crate::state::{DeploymentState, ResourceRecord};

/// Placeholder rendered instead of a sensitive value.
pub const SENSITIVE: &str = "(sensitive)";

/// Engine for computing diffs between declarations and recorded state.
#[derive(Debug, Default)]
pub struct DiffEngine {
    hasher: ConfigHasher,
}

/// Difference for a single instance.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Declared name.
    pub name: String,
    /// Kind the instance will have after the change.
    pub kind: ResourceKind,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Field-level differences.
    pub details: Vec<DiffDetail>,
    /// Identifier of the recorded entity, if any.
    pub id: Option<String>,
    /// Declaration hash the record was applied from.
    pub old_hash: Option<String>,
    /// Current declaration hash.
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Declared but not present remotely.
    Create,
    /// Mutable fields changed.
    Update,
    /// An immutable-on-create field or the kind changed.
    Replace,
    /// Recorded but no longer declared.
    Delete,
    /// Nothing to do.
    NoChange,
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Field name.
    pub field: String,
    /// Recorded value.
    pub old_value: Option<String>,
    /// Declared value.
    pub new_value: Option<String>,
    /// Changing this field replaces the entity.
    pub forces_new: bool,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All instance diffs, declarations first in file order.
    pub diffs: Vec<ResourceDiff>,
    /// Instances to create.
    pub creates: usize,
    /// Instances to update in place.
    pub updates: usize,
    /// Instances to replace.
    pub replaces: usize,
    /// Instances to delete.
    pub deletes: usize,
    /// Unchanged instances.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between the declarations and recorded state.
    #[must_use]
    pub fn compute_diff(&self, config: &DeployConfig, state: &DeploymentState) -> DiffResult {
        let mut diffs = Vec::with_capacity(config.resources.len());

        for resource in &config.resources {
            let new_hash = self.hasher.hash_resource(resource);
            diffs.push(Self::compute_resource_diff(resource, state.get(&resource.name), new_hash));
        }

        let declared: HashSet<&str> = config.resources.iter().map(|r| r.name.as_str()).collect();
        for record in state.resources.values().filter(|r| !declared.contains(r.name.as_str())) {
            debug!("{} is recorded but no longer declared", record.name);
            diffs.push(ResourceDiff {
                name: record.name.clone(),
                kind: record.kind,
                diff_type: DiffType::Delete,
                details: vec![],
                id: Some(record.id().to_string()).filter(|id| !id.is_empty()),
                old_hash: Some(record.config_hash.clone()),
                new_hash: None,
            });
        }

        DiffResult::from_diffs(diffs)
    }

    fn compute_resource_diff(
        resource: &ResourceConfig,
        record: Option<&ResourceRecord>,
        new_hash: String,
    ) -> ResourceDiff {
        let kind = resource.kind;
        let desired = resource.declared_state();

        let mut diff = ResourceDiff {
            name: resource.name.clone(),
            kind,
            diff_type: DiffType::Create,
            details: vec![],
            id: None,
            old_hash: record.map(|r| r.config_hash.clone()),
            new_hash: Some(new_hash),
        };

        let Some(record) = record.filter(|r| r.state.has_id()) else {
            debug!("{} needs to be created", resource.name);
            diff.details = field_details(kind, &DeclaredState::new(), &desired, true);
            return diff;
        };
        diff.id = Some(record.id().to_string());

        if record.kind != kind {
            debug!("{} changes kind from {} to {kind}", resource.name, record.kind);
            diff.diff_type = DiffType::Replace;
            diff.details = vec![DiffDetail {
                field: String::from("kind"),
                old_value: Some(record.kind.to_string()),
                new_value: Some(kind.to_string()),
                forces_new: true,
            }];
            return diff;
        }

        diff.diff_type = match classify(kind, &record.state, &desired) {
            ApplyAction::NoOp => DiffType::NoChange,
            ApplyAction::Update { .. } => DiffType::Update,
            ApplyAction::Replace { .. } => DiffType::Replace,
        };
        if diff.diff_type != DiffType::NoChange {
            diff.details = field_details(kind, &record.state, &desired, false);
        }

        debug!("{}: {}", resource.name, diff.diff_type);
        diff
    }
}

/// Changed fields between `prior` and `desired`, sensitive values masked.
fn field_details(
    kind: ResourceKind,
    prior: &DeclaredState,
    desired: &DeclaredState,
    creating: bool,
) -> Vec<DiffDetail> {
    kind.changed_fields(prior, desired)
        .into_iter()
        .filter(|f| creating || !kind.identity_fields().contains(&f.name))
        .map(|f| {
            let render = |value: Option<&AttrValue>| {
                value.map(|v| if f.sensitive { SENSITIVE.to_string() } else { v.to_string() })
            };
            DiffDetail {
                field: f.name.to_string(),
                old_value: render(prior.get(f.name)),
                new_value: render(desired.get(f.name)),
                forces_new: f.force_new && !creating,
            }
        })
        .collect()
}

impl DiffResult {
    fn from_diffs(diffs: Vec<ResourceDiff>) -> Self {
        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();
        Self {
            creates: count(DiffType::Create),
            updates: count(DiffType::Update),
            replaces: count(DiffType::Replace),
            deletes: count(DiffType::Delete),
            unchanged: count(DiffType::NoChange),
            diffs,
        }
    }

    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    /// Diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DiffDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let old = self.old_value.as_deref().unwrap_or("(unset)");
        let new = self.new_value.as_deref().unwrap_or("(unset)");
        write!(f, "{}: {old} -> {new}", self.field)?;
        if self.forces_new {
            write!(f, " (forces replacement)")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.kind, self.diff_type)?;
        if !self.details.is_empty() {
            let fields: Vec<&str> = self.details.iter().map(|d| d.field.as_str()).collect();
            write!(f, " ({})", fields.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, StateConfig};
    use std::collections::BTreeMap;

    fn resource(name: &str, kind: ResourceKind, attributes: &[(&str, AttrValue)]) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            kind,
            attributes: attributes
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn config(resources: Vec<ResourceConfig>) -> DeployConfig {
        DeployConfig {
            provider: ProviderSettings::for_domain("localhost"),
            state: StateConfig::default(),
            resources,
        }
    }

    fn member(roles: &[&str]) -> ResourceConfig {
        resource(
            "viewer",
            ResourceKind::OrgMember,
            &[
                ("user_id", AttrValue::from("42")),
                ("roles", AttrValue::set(roles.iter().copied())),
            ],
        )
    }

    fn recorded(resource: &ResourceConfig, id: &str) -> DeploymentState {
        let mut state = DeploymentState::new();
        state.record(&resource.name, resource.kind, resource.declared_state().with_id(id), "old");
        state
    }

    #[test]
    fn test_undeclared_unrecorded_is_create() {
        let engine = DiffEngine::new();
        let result = engine.compute_diff(&config(vec![member(&["ORG_OWNER"])]), &DeploymentState::new());

        assert_eq!(result.creates, 1);
        assert_eq!(result.diffs[0].diff_type, DiffType::Create);
        assert!(result.diffs[0].details.iter().any(|d| d.field == "roles"));
    }

    #[test]
    fn test_unchanged_member_is_no_change() {
        let engine = DiffEngine::new();
        let declared = member(&["ORG_OWNER"]);
        let state = recorded(&declared, "42");

        let result = engine.compute_diff(&config(vec![declared]), &state);
        assert!(!result.has_changes());
        assert_eq!(result.unchanged, 1);
    }

    #[test]
    fn test_role_change_is_update() {
        let engine = DiffEngine::new();
        let state = recorded(&member(&[]), "42");

        let result = engine.compute_diff(&config(vec![member(&["IAM_OWNER_VIEWER"])]), &state);
        assert_eq!(result.updates, 1);
        let detail = &result.diffs[0].details[0];
        assert_eq!(detail.field, "roles");
        assert!(!detail.forces_new);
    }

    #[test]
    fn test_user_change_is_replace() {
        let engine = DiffEngine::new();
        let state = recorded(&member(&[]), "42");
        let mut moved = member(&[]);
        moved.attributes.insert(String::from("user_id"), AttrValue::from("43"));

        let result = engine.compute_diff(&config(vec![moved]), &state);
        assert_eq!(result.replaces, 1);
        assert!(result.diffs[0].details.iter().any(|d| d.field == "user_id" && d.forces_new));
    }

    #[test]
    fn test_absent_record_is_recreated() {
        let engine = DiffEngine::new();
        let declared = member(&[]);
        let mut state = DeploymentState::new();
        state.record("viewer", ResourceKind::OrgMember, declared.declared_state(), "old");

        let result = engine.compute_diff(&config(vec![declared]), &state);
        assert_eq!(result.creates, 1);
    }

    #[test]
    fn test_undeclared_record_is_delete() {
        let engine = DiffEngine::new();
        let state = recorded(&member(&[]), "42");

        let result = engine.compute_diff(&config(vec![]), &state);
        assert_eq!(result.deletes, 1);
        assert_eq!(result.diffs[0].id.as_deref(), Some("42"));
    }

    #[test]
    fn test_sensitive_values_are_masked() {
        let engine = DiffEngine::new();
        let gitlab = resource(
            "gitlab",
            ResourceKind::IdpGitlabSelfHosted,
            &[
                ("name", AttrValue::from("GitLab")),
                ("issuer", AttrValue::from("https://gitlab.example.com")),
                ("client_id", AttrValue::from("client")),
                ("client_secret", AttrValue::from("hunter2")),
            ],
        );
        let state = recorded(&gitlab, "777");
        let mut rotated = gitlab.clone();
        rotated.attributes.insert(String::from("client_secret"), AttrValue::from("hunter3"));

        let result = engine.compute_diff(&config(vec![rotated]), &state);
        assert_eq!(result.updates, 1);
        let detail = &result.diffs[0].details[0];
        assert_eq!(detail.old_value.as_deref(), Some(SENSITIVE));
        assert_eq!(detail.new_value.as_deref(), Some(SENSITIVE));
        assert!(!detail.to_string().contains("hunter"));
    }

    #[test]
    fn test_unset_optional_matches_remote_default() {
        let engine = DiffEngine::new();
        let gitlab = resource(
            "gitlab",
            ResourceKind::IdpGitlabSelfHosted,
            &[
                ("name", AttrValue::from("GitLab")),
                ("issuer", AttrValue::from("https://gitlab.example.com")),
                ("client_id", AttrValue::from("client")),
                ("client_secret", AttrValue::from("s")),
            ],
        );
        let mut state = recorded(&gitlab, "777");
        let refreshed = state.resources["gitlab"]
            .state
            .clone()
            .with("is_linking_allowed", false)
            .with("scopes", AttrValue::empty_set());
        state.update_state("gitlab", refreshed);

        let result = engine.compute_diff(&config(vec![gitlab]), &state);
        assert_eq!(result.unchanged, 1);
    }
}
