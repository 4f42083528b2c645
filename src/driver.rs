//! Per-instance reconciliation driver.
//!
//! The driver is the uniform state machine every adapter is plugged into:
//! it decides between no-op, in-place update and replacement, absorbs
//! NotFound on refresh and destroy, and attaches the kind, identifier and
//! operation to every error it surfaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::resource::{has_changes, DeclaredState, FieldSpec, Operation, ReadOutcome, Resource, ResourceKind};
use crate::zitadel::ProviderContext;

/// Lifecycle of one entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// No remote entity; identifier empty.
    Absent,
    /// Create in flight.
    Creating,
    /// Remote entity exists; identifier set.
    Present,
    /// Update or replacement in flight.
    Updating,
    /// Delete in flight.
    Deleting,
    /// Import in flight.
    Importing,
}

/// How declared changes are carried to the remote entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyAction {
    /// Nothing outside the identity fields changed.
    NoOp,
    /// Mutable fields changed; update in place.
    Update {
        /// Changed fields.
        fields: Vec<&'static str>,
    },
    /// An immutable-on-create field changed; delete then create.
    Replace {
        /// Immutable fields that changed.
        fields: Vec<&'static str>,
    },
}

/// Decides how to carry `desired` onto an existing `prior` of `kind`.
///
/// Immutable-on-create fields are checked first; any change there means
/// replacement, never an update.
#[must_use]
pub fn classify(kind: ResourceKind, prior: &DeclaredState, desired: &DeclaredState) -> ApplyAction {
    let changed = kind.changed_fields(prior, desired);

    let immutable: Vec<&'static str> = changed.iter().filter(|f| f.force_new).map(|f| f.name).collect();
    if !immutable.is_empty() {
        return ApplyAction::Replace { fields: immutable };
    }

    if !has_changes(kind, prior, desired) {
        return ApplyAction::NoOp;
    }

    ApplyAction::Update {
        fields: changed
            .iter()
            .filter(|f| !kind.identity_fields().contains(&f.name))
            .map(|f| f.name)
            .collect(),
    }
}

/// Drives one adapter through its lifecycle.
pub struct EntityDriver {
    adapter: Box<dyn Resource>,
}

impl EntityDriver {
    /// Wraps an adapter.
    #[must_use]
    pub fn new(adapter: Box<dyn Resource>) -> Self {
        Self { adapter }
    }

    /// Builds the driver for a kind on top of a provider context.
    #[must_use]
    pub fn for_kind(kind: ResourceKind, ctx: &ProviderContext) -> Self {
        Self::new(kind.adapter(ctx))
    }

    /// The kind driven.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.adapter.kind()
    }

    /// Lifecycle of a recorded state at rest.
    #[must_use]
    pub fn lifecycle_of(state: &DeclaredState) -> Lifecycle {
        if state.has_id() {
            Lifecycle::Present
        } else {
            Lifecycle::Absent
        }
    }

    fn transition(&self, id: &str, from: Lifecycle, to: Lifecycle) {
        debug!("{} ({}): {from} -> {to}", self.kind(), crate::error::display_id(id));
    }

    fn wrap(&self, id: &str, operation: Operation, err: crate::error::ZitadelError) -> crate::error::ZitadelError {
        ReconcileError::wrap(self.kind().type_name(), id, operation, err)
    }

    /// Absent to Present: creates the remote entity.
    ///
    /// # Errors
    ///
    /// Returns the wrapped adapter error; the instance stays Absent.
    pub async fn create(&self, declared: &DeclaredState) -> Result<DeclaredState> {
        self.transition("", Lifecycle::Absent, Lifecycle::Creating);

        match self.adapter.create(declared).await {
            Ok(state) => {
                info!("Created {} ({})", self.kind(), state.id());
                self.transition(state.id(), Lifecycle::Creating, Lifecycle::Present);
                Ok(state)
            }
            Err(e) => {
                self.transition("", Lifecycle::Creating, Lifecycle::Absent);
                Err(self.wrap("", Operation::Create, e))
            }
        }
    }

    /// Reads the remote entity back into recorded state.
    ///
    /// NotFound clears the identifier and is not an error. A state without
    /// an identifier is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the wrapped adapter error for every other failure.
    pub async fn refresh(&self, recorded: &DeclaredState) -> Result<DeclaredState> {
        if !recorded.has_id() {
            return Ok(recorded.clone());
        }

        match self.adapter.read(recorded).await {
            Ok(ReadOutcome::Found(state)) => Ok(state),
            Ok(ReadOutcome::NotFound) => {
                warn!("{} ({}) no longer exists remotely", self.kind(), recorded.id());
                self.transition(recorded.id(), Lifecycle::Present, Lifecycle::Absent);
                let mut state = recorded.clone();
                state.clear_id();
                Ok(state)
            }
            Err(e) => Err(self.wrap(recorded.id(), Operation::Read, e)),
        }
    }

    /// Decides how to carry `desired` onto an existing `prior`.
    #[must_use]
    pub fn decide(&self, prior: &DeclaredState, desired: &DeclaredState) -> ApplyAction {
        classify(self.kind(), prior, desired)
    }

    /// Desired state with the prior identifier and service-assigned values
    /// carried forward.
    #[must_use]
    pub fn merge_planned(&self, prior: &DeclaredState, desired: &DeclaredState) -> DeclaredState {
        let mut planned = desired.clone().with_id(prior.id());
        for field in self.kind().fields().iter().filter(|f| carried_forward(f, desired)) {
            planned.copy_from(prior, field.name);
        }
        planned
    }

    /// Present to Present: applies `desired` over `prior`.
    ///
    /// An absent `prior` is created. A replacement deletes the old entity
    /// before creating the new one and never issues an update.
    ///
    /// # Errors
    ///
    /// Returns the wrapped adapter error of the failing step.
    pub async fn apply(&self, prior: &DeclaredState, desired: &DeclaredState) -> Result<DeclaredState> {
        if !prior.has_id() {
            return self.create(desired).await;
        }

        match self.decide(prior, desired) {
            ApplyAction::NoOp => {
                debug!("{} ({}) is up to date", self.kind(), prior.id());
                Ok(self.merge_planned(prior, desired))
            }
            ApplyAction::Update { fields } => {
                self.transition(prior.id(), Lifecycle::Present, Lifecycle::Updating);
                info!("Updating {} ({}): {}", self.kind(), prior.id(), fields.join(", "));

                let planned = self.merge_planned(prior, desired);
                let mut state = self
                    .adapter
                    .update(prior, &planned)
                    .await
                    .map_err(|e| self.wrap(prior.id(), Operation::Update, e))?;
                if !state.has_id() {
                    state.set_id(prior.id());
                }

                self.transition(state.id(), Lifecycle::Updating, Lifecycle::Present);
                Ok(state)
            }
            ApplyAction::Replace { fields } => {
                info!("Replacing {} ({}): {} cannot change in place", self.kind(), prior.id(), fields.join(", "));
                self.destroy(prior).await?;
                self.create(desired).await
            }
        }
    }

    /// Present to Absent: deletes the remote entity.
    ///
    /// An entity already gone counts as deleted. Returns the recorded state
    /// with its identifier cleared.
    ///
    /// # Errors
    ///
    /// Returns the wrapped adapter error for any other failure.
    pub async fn destroy(&self, recorded: &DeclaredState) -> Result<DeclaredState> {
        let mut state = recorded.clone();
        if !recorded.has_id() {
            return Ok(state);
        }

        self.transition(recorded.id(), Lifecycle::Present, Lifecycle::Deleting);
        match self.adapter.delete(recorded).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("{} ({}) was already deleted", self.kind(), recorded.id());
            }
            Err(e) => return Err(self.wrap(recorded.id(), Operation::Delete, e)),
        }

        info!("Deleted {} ({})", self.kind(), recorded.id());
        self.transition(recorded.id(), Lifecycle::Deleting, Lifecycle::Absent);
        state.clear_id();
        Ok(state)
    }

    /// Importing to Present: adopts an existing remote entity.
    ///
    /// # Errors
    ///
    /// Returns the wrapped input error for a malformed key, or the adapter
    /// error if the entity cannot be read.
    pub async fn import(&self, key: &str) -> Result<DeclaredState> {
        self.transition("", Lifecycle::Absent, Lifecycle::Importing);
        let state = self
            .adapter
            .import(key)
            .await
            .map_err(|e| self.wrap(key, Operation::Import, e))?;

        info!("Imported {} ({}) from '{key}'", self.kind(), state.id());
        self.transition(state.id(), Lifecycle::Importing, Lifecycle::Present);
        Ok(state)
    }
}

/// True for values the service owns at this point: computed-only fields,
/// and optional+computed fields the declaration leaves out.
fn carried_forward(field: &FieldSpec, desired: &DeclaredState) -> bool {
    field.is_computed_only() || (field.is_computed() && !desired.is_set(field.name))
}

impl fmt::Debug for EntityDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDriver").field("kind", &self.kind()).finish()
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Importing => "importing",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => write!(f, "no-op"),
            Self::Update { fields } => write!(f, "update ({})", fields.join(", ")),
            Self::Replace { fields } => write!(f, "replace ({})", fields.join(", ")),
        }
    }
}
