//! Recorded-state persistence.
//!
//! This module keeps the last known declared state of every instance in a
//! local JSON file, guarded by a lock file against concurrent runs.

mod local;
mod lock;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{generate_holder_id, LockInfo, StateLock};
pub use store::StateStore;
pub use types::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, ResourceRecord, STATE_VERSION,
};
