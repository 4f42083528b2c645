//! Recorded state of every declared entity instance.
//!
//! The recorded state is the last known declared state of each instance,
//! keyed by the name it has in the declaration file. It is what `plan`
//! diffs against and what `refresh` brings back in line with the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::driver::{EntityDriver, Lifecycle};
use crate::resource::{DeclaredState, ResourceKind};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete recorded state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// Hash of the last applied declaration file.
    #[serde(default)]
    pub config_hash: String,
    /// Recorded instances by declared name.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent operations.
    #[serde(default)]
    pub history: Vec<DeploymentHistoryEntry>,
}

/// One recorded entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Declared name.
    pub name: String,
    /// Entity kind.
    pub kind: ResourceKind,
    /// Last known declared state, identifier included.
    pub state: DeclaredState,
    /// Hash of the declaration this state was applied from.
    #[serde(default)]
    pub config_hash: String,
    /// When the instance was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: DeploymentOperation,
    /// Declaration hash at the time.
    pub config_hash: String,
    /// Instances affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message of a failed operation.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOperation {
    /// Plan execution.
    Apply,
    /// Read-back of every recorded instance.
    Refresh,
    /// Adoption of an existing entity.
    Import,
    /// Removal of every recorded instance.
    Destroy,
}

impl DeploymentState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            config_hash: String::new(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(name)
    }

    /// Records the state of an instance, keeping its creation time.
    pub fn record(&mut self, name: &str, kind: ResourceKind, state: DeclaredState, config_hash: &str) {
        let now = Utc::now();
        let created_at = self
            .resources
            .get(name)
            .filter(|existing| existing.kind == kind && existing.state.has_id())
            .map_or(now, |existing| existing.created_at);

        self.resources.insert(
            name.to_string(),
            ResourceRecord {
                name: name.to_string(),
                kind,
                state,
                config_hash: config_hash.to_string(),
                created_at,
                updated_at: now,
            },
        );
        self.last_updated = now;
    }

    /// Replaces the declared state of an existing record.
    ///
    /// Returns false if no record has that name.
    pub fn update_state(&mut self, name: &str, state: DeclaredState) -> bool {
        let Some(record) = self.resources.get_mut(name) else {
            return false;
        };
        record.state = state;
        record.updated_at = Utc::now();
        self.last_updated = record.updated_at;
        true
    }

    /// Removes a record by name.
    pub fn remove(&mut self, name: &str) -> Option<ResourceRecord> {
        let result = self.resources.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry, dropping the oldest past the cap.
    pub fn add_history(&mut self, entry: DeploymentHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Records whose remote entity is believed to exist.
    #[must_use]
    pub fn present(&self) -> Vec<&ResourceRecord> {
        self.resources.values().filter(|r| r.state.has_id()).collect()
    }

    /// All recorded names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRecord {
    /// Lifecycle of the recorded instance at rest.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        EntityDriver::lifecycle_of(&self.state)
    }

    /// Identifier of the remote entity, empty when absent.
    #[must_use]
    pub fn id(&self) -> &str {
        self.state.id()
    }
}

impl DeploymentHistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: DeploymentOperation, config_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: DeploymentOperation,
        config_hash: &str,
        resources: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::new(operation, config_hash, resources)
        }
    }
}

impl std::fmt::Display for DeploymentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Refresh => "refresh",
            Self::Import => "import",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
