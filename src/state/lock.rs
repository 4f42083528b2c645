//! Lock guarding the state file against concurrent runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

use super::store::StateStore;

/// Lock expiry in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300;

/// Information about a held lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// Operation the holder is running.
    #[serde(default)]
    pub operation: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a lock for `holder` running `operation`.
    #[must_use]
    pub fn new(holder: &str, operation: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            operation: operation.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Seconds until expiry.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} held by {} for '{}' since {} ({}s left)",
            self.lock_id,
            self.holder,
            self.operation,
            self.acquired_at.to_rfc3339(),
            self.remaining_secs()
        )
    }
}

/// A lock acquired for the duration of one operation.
///
/// Must be released explicitly; an unreleased lock expires on its own.
#[derive(Debug)]
#[must_use = "a state lock should be released"]
pub struct StateLock {
    info: LockInfo,
}

impl StateLock {
    /// Acquires the state lock for this process.
    ///
    /// # Errors
    ///
    /// Returns an error if another process holds an unexpired lock.
    pub async fn acquire(store: &dyn StateStore, operation: &str) -> Result<Self> {
        let info = store.acquire_lock(&generate_holder_id(), operation).await?;
        Ok(Self { info })
    }

    /// Gets the lock info.
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Releases the lock.
    ///
    /// A failed release is logged; the lock expires on its own.
    pub async fn release(self, store: &dyn StateStore) {
        if let Err(e) = store.release_lock(&self.info.lock_id).await {
            warn!("Failed to release state lock {}: {e}", self.info.lock_id);
        }
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());
    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lock_is_live() {
        let lock = LockInfo::new("ci-runner", "apply");
        assert!(!lock.is_expired());
        assert!(lock.remaining_secs() > 0);
        assert!(lock.to_string().contains("ci-runner"));
    }

    #[test]
    fn test_backdated_lock_is_expired() {
        let mut lock = LockInfo::new("ci-runner", "apply");
        lock.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(lock.is_expired());
        assert_eq!(lock.remaining_secs(), 0);
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        assert_ne!(id1, id2);
        assert!(id1.contains(&std::process::id().to_string()));
    }
}
