//! Create, update, import and delete scenario for one entity kind.
//!
//! A scenario declares an entity with one attribute blanked, confirms the
//! blank value remotely, sets the attribute and confirms the change
//! happened in place, optionally re-imports the entity, then deletes it and
//! waits for the service to stop reporting it.

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::driver::EntityDriver;
use crate::error::{HarnessError, ZitadelError};
use crate::resource::{AttrValue, DeclaredState, ResourceKind, GENERATED_ID_PATTERN};
use crate::zitadel::ProviderContext;

use super::check::{verify, Expectation, RemoteCheck};
use super::dependency::{DeclareFn, Dependency, DependencyIds};
use super::poll::PollPolicy;

/// Step names, as they appear in reports and errors.
pub mod steps {
    /// Create with the attribute blanked.
    pub const CREATE: &str = "create";
    /// Update of the attribute to its target value.
    pub const UPDATE: &str = "update";
    /// Import round-trip.
    pub const IMPORT: &str = "import";
    /// Delete and wait for absence.
    pub const DELETE: &str = "delete";
}

/// A lifecycle scenario for one entity kind.
pub struct LifecycleScenario {
    kind: ResourceKind,
    declare: DeclareFn,
    attribute: &'static str,
    initial: AttrValue,
    target: AttrValue,
    check: Box<dyn RemoteCheck>,
    dependencies: Vec<Box<dyn Dependency>>,
    id_pattern: String,
    import: bool,
    import_ignore: Vec<&'static str>,
    poll: PollPolicy,
}

/// Outcome of one completed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step name.
    pub step: &'static str,
    /// Identifier after the step.
    pub id: String,
    /// Polling attempts the remote check needed; `None` for steps without
    /// a remote check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

/// Outcome of a passed scenario.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    /// Kind exercised.
    pub kind: ResourceKind,
    /// Identifier the entity had while it existed.
    pub id: String,
    /// Completed steps in order.
    pub steps: Vec<StepReport>,
    /// Provisioned dependency identifiers.
    pub dependencies: DependencyIds,
}

impl LifecycleScenario {
    /// Creates a scenario moving `attribute` from `initial` to `target`.
    ///
    /// `declare` builds the declared state from the dependency identifiers;
    /// whatever it sets for `attribute` is overridden.
    pub fn new(
        kind: ResourceKind,
        attribute: &'static str,
        initial: impl Into<AttrValue>,
        target: impl Into<AttrValue>,
        check: impl RemoteCheck + 'static,
        declare: impl Fn(&DependencyIds) -> DeclaredState + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            declare: Box::new(declare),
            attribute,
            initial: initial.into(),
            target: target.into(),
            check: Box::new(check),
            dependencies: vec![],
            id_pattern: GENERATED_ID_PATTERN.to_string(),
            import: false,
            import_ignore: vec![],
            poll: PollPolicy::default(),
        }
    }

    /// Adds a dependency, provisioned after the ones added before it.
    #[must_use]
    pub fn dependency(mut self, dependency: impl Dependency + 'static) -> Self {
        self.dependencies.push(Box::new(dependency));
        self
    }

    /// Overrides the pattern the created identifier must match.
    #[must_use]
    pub fn id_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.id_pattern = pattern.into();
        self
    }

    /// Re-imports the entity after the update and compares every
    /// non-sensitive declared field except `ignore`.
    #[must_use]
    pub fn with_import(mut self, ignore: &[&'static str]) -> Self {
        self.import = true;
        self.import_ignore = ignore.to_vec();
        self
    }

    /// Overrides the polling policy of the remote checks.
    #[must_use]
    pub const fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Runs the scenario.
    ///
    /// Once created, the entity under test is deleted again if a later
    /// step fails. Dependencies are torn down in reverse order whatever the outcome.
    /// A scenario failure takes precedence over a teardown failure.
    ///
    /// # Errors
    ///
    /// Returns the first failing step as a [`HarnessError`].
    pub async fn run(mut self, ctx: &ProviderContext) -> Result<LifecycleReport, HarnessError> {
        info!("Lifecycle scenario for {}", self.kind);

        let mut ids = DependencyIds::new();
        let mut provisioned = 0;
        let mut outcome = Ok(());
        for dependency in &mut self.dependencies {
            match dependency.provision(ctx, &ids).await {
                Ok(id) => {
                    info!("Provisioned dependency '{}' ({id})", dependency.name());
                    ids.insert(dependency.name().to_string(), id);
                    provisioned += 1;
                }
                Err(e) => {
                    outcome = Err(HarnessError::Dependency {
                        dependency: dependency.name().to_string(),
                        source: Box::new(e),
                    });
                    break;
                }
            }
        }

        let result = match outcome {
            Ok(()) => self.run_steps(ctx, &ids).await,
            Err(e) => Err(e),
        };

        let mut teardown = Ok(());
        for dependency in self.dependencies[..provisioned].iter().rev() {
            if let Err(e) = dependency.teardown(ctx).await {
                warn!("Failed to tear down dependency '{}': {e}", dependency.name());
                if teardown.is_ok() {
                    teardown = Err(HarnessError::Dependency {
                        dependency: dependency.name().to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }

        let completed = result?;
        teardown?;

        Ok(LifecycleReport {
            kind: self.kind,
            id: completed.first().map(|s| s.id.clone()).unwrap_or_default(),
            steps: completed,
            dependencies: ids,
        })
    }

    async fn run_steps(&self, ctx: &ProviderContext, ids: &DependencyIds) -> Result<Vec<StepReport>, HarnessError> {
        let driver = EntityDriver::for_kind(self.kind, ctx);
        let declared = (self.declare)(ids);
        let mut completed = Vec::new();

        let blanked = declared.clone().with(self.attribute, self.initial.clone());
        let created = driver
            .create(&blanked)
            .await
            .map_err(|e| step_failed(steps::CREATE, e))?;

        let mut last = created.clone();
        let result = self
            .steps_after_create(ctx, &driver, declared, &created, &mut last, &mut completed)
            .await;

        if let Err(e) = result {
            if let Err(cleanup) = driver.destroy(&last).await {
                warn!("Failed to delete {} ({}) after failed scenario: {cleanup}", self.kind, last.id());
            }
            return Err(e);
        }
        Ok(completed)
    }

    /// Runs every step after Create, keeping `last` at the most recent
    /// known state of the entity under test.
    async fn steps_after_create(
        &self,
        ctx: &ProviderContext,
        driver: &EntityDriver,
        declared: DeclaredState,
        created: &DeclaredState,
        last: &mut DeclaredState,
        completed: &mut Vec<StepReport>,
    ) -> Result<(), HarnessError> {
        self.check_id(created)?;
        let attempts = self
            .confirm(ctx, steps::CREATE, created, Expectation::Value(self.initial.clone()))
            .await?;
        completed.push(StepReport {
            step: steps::CREATE,
            id: created.id().to_string(),
            attempts: Some(attempts),
        });

        let desired = declared.with(self.attribute, self.target.clone());
        let updated = driver
            .apply(created, &desired)
            .await
            .map_err(|e| step_failed(steps::UPDATE, e))?;
        last.clone_from(&updated);
        if updated.id() != created.id() {
            return Err(HarnessError::Recreated {
                step: steps::UPDATE.to_string(),
                before: created.id().to_string(),
                after: updated.id().to_string(),
            });
        }
        let attempts = self
            .confirm(ctx, steps::UPDATE, &updated, Expectation::Value(self.target.clone()))
            .await?;
        completed.push(StepReport {
            step: steps::UPDATE,
            id: updated.id().to_string(),
            attempts: Some(attempts),
        });

        if self.import {
            self.import_round_trip(driver, &desired, &updated).await?;
            completed.push(StepReport {
                step: steps::IMPORT,
                id: updated.id().to_string(),
                attempts: None,
            });
        }

        driver
            .destroy(&updated)
            .await
            .map_err(|e| step_failed(steps::DELETE, e))?;
        let attempts = self.confirm(ctx, steps::DELETE, &updated, Expectation::Absent).await?;
        completed.push(StepReport {
            step: steps::DELETE,
            id: updated.id().to_string(),
            attempts: Some(attempts),
        });

        Ok(())
    }

    fn check_id(&self, created: &DeclaredState) -> Result<(), HarnessError> {
        let pattern = Regex::new(&self.id_pattern).map_err(|e| {
            step_failed(steps::CREATE, ZitadelError::internal(format!("bad identifier pattern: {e}")))
        })?;

        if pattern.is_match(created.id()) {
            return Ok(());
        }
        Err(HarnessError::IdFormat {
            step: steps::CREATE.to_string(),
            id: created.id().to_string(),
            pattern: self.id_pattern.clone(),
        })
    }

    async fn confirm(
        &self,
        ctx: &ProviderContext,
        step: &str,
        state: &DeclaredState,
        expected: Expectation,
    ) -> Result<u32, HarnessError> {
        let check = self.check.as_ref();
        let (_, attempts) = self
            .poll
            .run(step, || verify(check, ctx, state, &expected))
            .await?;
        Ok(attempts)
    }

    /// Imports the entity by the key its own state formats to and compares
    /// the declared fields.
    async fn import_round_trip(
        &self,
        driver: &EntityDriver,
        desired: &DeclaredState,
        existing: &DeclaredState,
    ) -> Result<(), HarnessError> {
        let key = self.kind.import_format().format(existing);
        let imported = driver
            .import(&key)
            .await
            .map_err(|e| step_failed(steps::IMPORT, e))?;

        let compared = self.kind.fields().iter().filter(|f| {
            !f.sensitive
                && !f.is_computed_only()
                && desired.is_set(f.name)
                && !self.import_ignore.contains(&f.name)
        });
        for field in compared {
            let zero = field.field_type.zero();
            let want = desired.get(field.name).unwrap_or(&zero);
            let got = imported.get(field.name).unwrap_or(&zero);
            if want != got {
                return Err(HarnessError::FieldMismatch {
                    step: steps::IMPORT.to_string(),
                    field: field.name.to_string(),
                    expected: want.to_string(),
                    actual: got.to_string(),
                });
            }
        }

        if imported.id() != existing.id() {
            return Err(HarnessError::FieldMismatch {
                step: steps::IMPORT.to_string(),
                field: String::from("id"),
                expected: existing.id().to_string(),
                actual: imported.id().to_string(),
            });
        }
        Ok(())
    }
}

fn step_failed(step: &str, source: ZitadelError) -> HarnessError {
    HarnessError::StepFailed {
        step: step.to_string(),
        source: Box::new(source),
    }
}
