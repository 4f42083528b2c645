//! Project-level reconciliation.
//!
//! This module ties the declaration file, the recorded state and the
//! entity drivers together: it refreshes recorded instances, plans and
//! applies changes, reports drift, adopts existing entities and tears
//! everything down. Every mutating run holds the state lock.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigHasher, DeployConfig};
use crate::driver::EntityDriver;
use crate::error::{Result, StateError};
use crate::planner::{DeploymentPlan, DiffEngine, DiffResult, ExecutionResult, PlanExecutor};
use crate::resource::{DeclaredState, ResourceKind};
use crate::state::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, StateLock, StateStore,
};
use crate::zitadel::ProviderContext;

/// Reconciler for one declaration file.
pub struct Reconciler<'a> {
    config: &'a DeployConfig,
    state_store: &'a dyn StateStore,
    ctx: &'a ProviderContext,
    hasher: ConfigHasher,
    diff_engine: DiffEngine,
    continue_on_error: bool,
    refresh: bool,
}

/// Result of an apply run.
#[derive(Debug, Serialize)]
pub struct ReconciliationResult {
    /// Whether every action succeeded.
    pub success: bool,
    /// Number of instances created, replacements included.
    pub created: usize,
    /// Number of instances updated in place.
    pub updated: usize,
    /// Number of instances deleted, replacements excluded.
    pub deleted: usize,
    /// Number of instances unchanged.
    pub unchanged: usize,
    /// Errors encountered.
    pub errors: Vec<String>,
    /// Final state after reconciliation.
    #[serde(skip)]
    pub final_state: Option<DeploymentState>,
}

/// Result of reading every recorded instance back.
#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    /// Number of instances read.
    pub refreshed: usize,
    /// Instances whose remote attributes changed.
    pub drifted: Vec<DriftedResource>,
    /// Instances the service no longer has.
    pub gone: Vec<String>,
}

/// One instance whose remote attributes moved away from the recorded ones.
#[derive(Debug, Clone, Serialize)]
pub struct DriftedResource {
    /// Declared name.
    pub name: String,
    /// Entity kind.
    pub kind: ResourceKind,
    /// Fields that changed remotely.
    pub fields: Vec<String>,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether anything drifted or is pending.
    pub has_drift: bool,
    /// Instances changed outside this tool.
    pub drifted_resources: Vec<DriftedResource>,
    /// Instances deleted outside this tool.
    pub gone: Vec<String>,
    /// Instances with declared changes not yet applied.
    pub pending: Vec<String>,
    /// Total number of declared instances.
    pub total_resources: usize,
    /// Number of recorded instances.
    pub recorded_count: usize,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(config: &'a DeployConfig, state_store: &'a dyn StateStore, ctx: &'a ProviderContext) -> Self {
        Self {
            config,
            state_store,
            ctx,
            hasher: ConfigHasher::new(),
            diff_engine: DiffEngine::new(),
            continue_on_error: false,
            refresh: true,
        }
    }

    /// Sets whether apply keeps going after a failed action.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Sets whether plan and apply read recorded instances back first.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Hash of the declaration file.
    #[must_use]
    pub fn config_hash(&self) -> String {
        self.hasher.hash_config(self.config)
    }

    /// Diffs the declarations against `state` and builds the plan.
    #[must_use]
    pub fn plan_against(&self, state: &DeploymentState) -> (DiffResult, DeploymentPlan) {
        let diff = self.diff_engine.compute_diff(self.config, state);
        info!(
            "Diff: {} creates, {} updates, {} replaces, {} deletes, {} unchanged",
            diff.creates, diff.updates, diff.replaces, diff.deletes, diff.unchanged
        );
        let plan = DeploymentPlan::from_diff(&diff, self.config, &self.config_hash());
        (diff, plan)
    }

    /// Loads the recorded state, refreshes a copy if enabled, and plans.
    ///
    /// Nothing is saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded or a refresh fails.
    pub async fn plan(&self) -> Result<(DiffResult, DeploymentPlan)> {
        let mut state = self.state_store.load_or_default().await?;
        if self.refresh {
            self.refresh_state(&mut state).await?;
        }
        Ok(self.plan_against(&state))
    }

    /// Refreshes, plans and executes under the state lock.
    ///
    /// State is saved even when actions fail, so every remote change that
    /// did happen is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, the state cannot be
    /// loaded or saved, a refresh fails, or the run is cancelled.
    pub async fn reconcile(&self) -> Result<ReconciliationResult> {
        let lock = StateLock::acquire(self.state_store, "apply").await?;
        let result = self.reconcile_locked().await;
        lock.release(self.state_store).await;
        result
    }

    async fn reconcile_locked(&self) -> Result<ReconciliationResult> {
        let mut state = self.state_store.load_or_default().await?;
        if self.refresh {
            self.refresh_state(&mut state).await?;
        }

        let (diff, plan) = self.plan_against(&state);
        if plan.is_empty() {
            info!("No changes required - state is converged");
            state.config_hash.clone_from(&plan.config_hash);
            self.state_store.save(&state).await?;
            return Ok(ReconciliationResult {
                success: true,
                created: 0,
                updated: 0,
                deleted: 0,
                unchanged: diff.unchanged,
                errors: vec![],
                final_state: Some(state),
            });
        }

        let executed = PlanExecutor::new(self.ctx)
            .with_continue_on_error(self.continue_on_error)
            .execute(&plan, &mut state)
            .await;

        if let Err(e) = self.state_store.save(&state).await {
            error!("Failed to save state: {e}");
            return Err(e);
        }
        let execution = executed?;

        let mut errors: Vec<String> = execution
            .failures()
            .into_iter()
            .map(|(action, error)| format!("{}: {error}", action.description()))
            .collect();
        if !execution.success {
            errors.insert(
                0,
                format!("{} of {} actions failed", execution.failed, execution.total_executed),
            );
        }

        Ok(ReconciliationResult {
            success: execution.success,
            created: diff.creates + diff.replaces,
            updated: diff.updates,
            deleted: diff.deletes,
            unchanged: diff.unchanged,
            errors,
            final_state: Some(state),
        })
    }

    /// Reads every recorded instance back and saves the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, a read fails for any
    /// reason other than absence, or the state cannot be saved.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let lock = StateLock::acquire(self.state_store, "refresh").await?;
        let result = async {
            let mut state = self.state_store.load_or_default().await?;
            let report = self.refresh_state(&mut state).await;

            let resources = state.names().into_iter().map(String::from).collect();
            let entry = match &report {
                Ok(_) => DeploymentHistoryEntry::new(DeploymentOperation::Refresh, &state.config_hash, resources),
                Err(e) => DeploymentHistoryEntry::failed(
                    DeploymentOperation::Refresh,
                    &state.config_hash,
                    resources,
                    &e.to_string(),
                ),
            };
            state.add_history(entry);
            self.state_store.save(&state).await?;
            report
        }
        .await;
        lock.release(self.state_store).await;
        result
    }

    /// Refreshes `state` in place.
    ///
    /// Instances the service no longer has keep their record with the
    /// identifier cleared, so the next plan recreates them.
    async fn refresh_state(&self, state: &mut DeploymentState) -> Result<RefreshReport> {
        let recorded: Vec<(String, ResourceKind, DeclaredState)> = state
            .present()
            .into_iter()
            .map(|r| (r.name.clone(), r.kind, r.state.clone()))
            .collect();

        let mut report = RefreshReport::default();
        for (name, kind, prior) in recorded {
            debug!("Refreshing {kind} '{name}'");
            let refreshed = EntityDriver::for_kind(kind, self.ctx).refresh(&prior).await?;

            if refreshed.has_id() {
                let fields: Vec<String> = kind
                    .changed_fields(&prior, &refreshed)
                    .into_iter()
                    .map(|f| f.name.to_string())
                    .collect();
                if !fields.is_empty() {
                    info!("{kind} '{name}' changed remotely: {}", fields.join(", "));
                    report.drifted.push(DriftedResource { name: name.clone(), kind, fields });
                }
            } else {
                report.gone.push(name.clone());
            }

            state.update_state(&name, refreshed);
            report.refreshed += 1;
        }

        Ok(report)
    }

    /// Reports remote drift and pending declared changes without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded or a read fails.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        info!("Checking for drift against {}", self.config.provider.base_url());

        let mut state = self.state_store.load_or_default().await?;
        let recorded_count = state.resources.len();
        let refresh = self.refresh_state(&mut state).await?;
        let diff = self.diff_engine.compute_diff(self.config, &state);

        let pending: Vec<String> = diff
            .actionable_diffs()
            .into_iter()
            .map(|d| d.name.clone())
            .collect();

        Ok(DriftReport {
            has_drift: !refresh.drifted.is_empty() || !refresh.gone.is_empty() || !pending.is_empty(),
            drifted_resources: refresh.drifted,
            gone: refresh.gone,
            pending,
            total_resources: self.config.resources.len(),
            recorded_count,
        })
    }

    /// Adopts an existing remote entity under a declared name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name already tracks a live entity, the key
    /// is malformed, the entity cannot be read, or the state cannot be
    /// saved.
    pub async fn import(&self, name: &str, kind: ResourceKind, key: &str) -> Result<DeclaredState> {
        let lock = StateLock::acquire(self.state_store, "import").await?;
        let result = self.import_locked(name, kind, key).await;
        lock.release(self.state_store).await;
        result
    }

    async fn import_locked(&self, name: &str, kind: ResourceKind, key: &str) -> Result<DeclaredState> {
        let mut state = self.state_store.load_or_default().await?;
        if let Some(existing) = state.get(name)
            && existing.state.has_id()
        {
            return Err(StateError::Corrupted {
                message: format!("'{name}' already tracks {} ({})", existing.kind, existing.id()),
            }
            .into());
        }

        if let Some(declared) = self.config.resource(name)
            && declared.kind != kind
        {
            warn!("'{name}' is declared as {} but imported as {kind}", declared.kind);
        }

        let imported = EntityDriver::for_kind(kind, self.ctx).import(key).await?;

        let hash = self
            .config
            .resource(name)
            .map(|r| self.hasher.hash_resource(r))
            .unwrap_or_default();
        state.record(name, kind, imported.clone(), &hash);
        state.add_history(DeploymentHistoryEntry::new(
            DeploymentOperation::Import,
            &state.config_hash,
            vec![name.to_string()],
        ));
        self.state_store.save(&state).await?;

        Ok(imported)
    }

    /// Deletes every recorded instance under the state lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, the state cannot be
    /// loaded or saved, or the run is cancelled. Failed deletes are
    /// reported in the result.
    pub async fn destroy_all(&self) -> Result<ExecutionResult> {
        let lock = StateLock::acquire(self.state_store, "destroy").await?;
        let result = self.destroy_locked().await;
        lock.release(self.state_store).await;
        result
    }

    async fn destroy_locked(&self) -> Result<ExecutionResult> {
        let mut state = self.state_store.load_or_default().await?;

        let nothing_declared = DeployConfig {
            resources: vec![],
            ..self.config.clone()
        };
        let diff = self.diff_engine.compute_diff(&nothing_declared, &state);
        let plan = DeploymentPlan::from_diff(&diff, &nothing_declared, "");
        info!("Destroying {} recorded instance(s)", plan.action_count());

        let executed = PlanExecutor::new(self.ctx)
            .with_continue_on_error(true)
            .with_operation(DeploymentOperation::Destroy)
            .execute(&plan, &mut state)
            .await;
        self.state_store.save(&state).await?;

        let execution = executed?;
        if !execution.success {
            warn!("{execution}");
        }
        Ok(execution)
    }
}

impl RefreshReport {
    /// Returns true if nothing changed remotely.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.gone.is_empty()
    }
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_drift {
            return write!(f, "No drift detected - state is converged");
        }

        writeln!(f, "Drift detected:")?;
        for resource in &self.drifted_resources {
            writeln!(f, "  ~ {} ({}): {}", resource.name, resource.kind, resource.fields.join(", "))?;
        }
        for name in &self.gone {
            writeln!(f, "  - {name}: deleted outside this tool")?;
        }
        for name in &self.pending {
            writeln!(f, "  * {name}: declared changes not applied")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, ResourceConfig, StateConfig};
    use crate::error::ApiError;
    use crate::resource::AttrValue;
    use crate::state::LocalStateStore;
    use crate::zitadel::{HttpMethod, MockTransport};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn member(name: &str, user: &str, roles: &[&str]) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            kind: ResourceKind::InstanceMember,
            attributes: BTreeMap::from([
                (String::from("user_id"), AttrValue::from(user)),
                (String::from("roles"), AttrValue::set(roles.iter().copied())),
            ]),
        }
    }

    fn config(resources: Vec<ResourceConfig>) -> DeployConfig {
        DeployConfig {
            provider: ProviderSettings::for_domain("localhost"),
            state: StateConfig::default(),
            resources,
        }
    }

    #[tokio::test]
    async fn test_refresh_clears_deleted_instances() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());

        let mut state = DeploymentState::new();
        state.record(
            "admin",
            ResourceKind::InstanceMember,
            member("admin", "42", &["IAM_OWNER"]).declared_state().with_id("42"),
            "",
        );
        store.save(&state).await.expect("save");

        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|call| call.method == HttpMethod::Post && call.path == "/admin/v1/members/_search")
            .times(1)
            .returning(|_| Ok(json!({"result": []})));
        let ctx = ProviderContext::new(Arc::new(mock));

        let declared = config(vec![]);
        let report = Reconciler::new(&declared, &store, &ctx)
            .refresh()
            .await
            .expect("refresh");

        assert_eq!(report.gone, vec![String::from("admin")]);
        let saved = store.load().await.expect("load").expect("state");
        assert!(!saved.resources["admin"].state.has_id());
        assert!(!store.is_locked().await.expect("lock check"));
    }

    #[tokio::test]
    async fn test_reconcile_creates_and_saves() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());

        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|call| call.method == HttpMethod::Post && call.path == "/admin/v1/members")
            .times(1)
            .returning(|_| Ok(json!({})));
        let ctx = ProviderContext::new(Arc::new(mock));

        let declared = config(vec![member("admin", "42", &["IAM_OWNER_VIEWER"])]);
        let result = Reconciler::new(&declared, &store, &ctx)
            .reconcile()
            .await
            .expect("reconcile");

        assert!(result.success);
        assert_eq!(result.created, 1);
        let saved = store.load().await.expect("load").expect("state");
        assert_eq!(saved.resources["admin"].id(), "42");
        assert!(!saved.config_hash.is_empty());
    }

    #[tokio::test]
    async fn test_drift_reports_remote_role_change() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());

        let admin = member("admin", "42", &["IAM_OWNER"]);
        let mut state = DeploymentState::new();
        state.record("admin", ResourceKind::InstanceMember, admin.declared_state().with_id("42"), "");
        store.save(&state).await.expect("save");

        let mut mock = MockTransport::new();
        mock.expect_send()
            .returning(|_| Ok(json!({"result": [{"userId": "42", "roles": ["IAM_OWNER_VIEWER"]}]})));
        let ctx = ProviderContext::new(Arc::new(mock));

        let declared = config(vec![admin]);
        let report = Reconciler::new(&declared, &store, &ctx)
            .check_drift()
            .await
            .expect("drift");

        assert!(report.has_drift);
        assert_eq!(report.drifted_resources[0].fields, vec![String::from("roles")]);
        assert_eq!(report.pending, vec![String::from("admin")]);
    }

    #[tokio::test]
    async fn test_destroy_all_forgets_every_record() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());

        let mut state = DeploymentState::new();
        for (name, user) in [("a", "1"), ("b", "2")] {
            state.record(
                name,
                ResourceKind::InstanceMember,
                member(name, user, &[]).declared_state().with_id(user),
                "",
            );
        }
        store.save(&state).await.expect("save");

        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|call| call.method == HttpMethod::Delete)
            .times(2)
            .returning(|_| Err(ApiError::NotFound { message: String::from("gone") }));
        let ctx = ProviderContext::new(Arc::new(mock));

        let declared = config(vec![]);
        let result = Reconciler::new(&declared, &store, &ctx)
            .destroy_all()
            .await
            .expect("destroy");

        assert!(result.success);
        let saved = store.load().await.expect("load").expect("state");
        assert!(saved.resources.is_empty());
        assert_eq!(saved.history.last().map(|h| h.operation), Some(DeploymentOperation::Destroy));
    }

    #[tokio::test]
    async fn test_import_refuses_live_name() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());

        let mut state = DeploymentState::new();
        state.record(
            "admin",
            ResourceKind::InstanceMember,
            member("admin", "42", &[]).declared_state().with_id("42"),
            "",
        );
        store.save(&state).await.expect("save");

        let mut mock = MockTransport::new();
        mock.expect_send().never();
        let ctx = ProviderContext::new(Arc::new(mock));

        let declared = config(vec![]);
        let err = Reconciler::new(&declared, &store, &ctx)
            .import("admin", ResourceKind::InstanceMember, "43")
            .await
            .expect_err("name is taken");
        assert!(err.to_string().contains("already tracks"));
    }
}
