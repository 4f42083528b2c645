//! The per-kind CRUD contract every entity adapter implements.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::error::{ApiError, Result};

use super::kind::ResourceKind;
use super::state::DeclaredState;

/// One reconciliation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create the remote entity.
    Create,
    /// Read the remote entity back into declared state.
    Read,
    /// Update the remote entity in place.
    Update,
    /// Delete the remote entity.
    Delete,
    /// Adopt a pre-existing remote entity.
    Import,
}

/// Result of reading a remote entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The entity exists; declared state refreshed from it.
    Found(DeclaredState),
    /// The service reports the entity does not exist.
    NotFound,
}

/// Create/Read/Update/Delete/Import for one entity kind.
///
/// Adapters are stateless apart from the provider context they were built
/// with; every call derives its scope from the declared state it is given.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resource: Send + Sync {
    /// The kind this adapter serves.
    fn kind(&self) -> ResourceKind;

    /// Creates the remote entity and returns declared state with its
    /// identifier and service-assigned fields populated.
    async fn create(&self, declared: &DeclaredState) -> Result<DeclaredState>;

    /// Fetches the remote entity identified by `declared`.
    ///
    /// Sensitive fields are carried over from `declared` untouched.
    async fn read(&self, declared: &DeclaredState) -> Result<ReadOutcome>;

    /// Applies `planned` over `prior`. Issues no remote call when nothing
    /// outside the identity fields changed.
    async fn update(&self, prior: &DeclaredState, planned: &DeclaredState) -> Result<DeclaredState>;

    /// Deletes the remote entity. An already-absent entity is not an error.
    async fn delete(&self, declared: &DeclaredState) -> Result<()>;

    /// Resolves an Import Key into declared state.
    async fn import(&self, key: &str) -> Result<DeclaredState> {
        let parsed = self.kind().import_format().parse(key)?;
        match self.read(&parsed.seed()).await? {
            ReadOutcome::Found(state) => Ok(state),
            ReadOutcome::NotFound => Err(ApiError::NotFound {
                message: format!("no {} matches import key '{key}'", self.kind()),
            }
            .into()),
        }
    }
}

/// Returns true if any field outside the kind's identity fields differs.
#[must_use]
pub fn has_changes(kind: ResourceKind, prior: &DeclaredState, planned: &DeclaredState) -> bool {
    kind.changed_fields(prior, planned)
        .iter()
        .any(|field| !kind.identity_fields().contains(&field.name))
}

/// Maps a NotFound delete response to success.
///
/// # Errors
///
/// Returns every other API error unchanged.
pub fn absent_ok(result: std::result::Result<(), ApiError>) -> std::result::Result<(), ApiError> {
    match result {
        Err(err) if err.is_not_found() => {
            tracing::debug!("Entity already absent: {err}");
            Ok(())
        }
        other => other,
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        write!(f, "{s}")
    }
}
