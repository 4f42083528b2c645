//! Entity model shared by every kind.
//!
//! This module holds the declared-state representation, the closed set of
//! entity kinds with their field surfaces, the Import Key codec and the
//! CRUD contract adapters implement.

mod adapter;
mod import_id;
mod kind;
mod state;
mod value;

pub use adapter::{absent_ok, has_changes, Operation, ReadOutcome, Resource};
#[cfg(test)]
pub use adapter::MockResource;
pub use import_id::{ImportFormat, ImportKey, ImportSegment, DELIMITER, ID_SEGMENT};
pub use kind::{FieldSpec, Presence, ResourceKind, Scope, GENERATED_ID_PATTERN};
pub use state::DeclaredState;
pub use value::{AttrValue, FieldType};
