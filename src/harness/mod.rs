//! Lifecycle verification.
//!
//! This module drives one entity kind through create, update, optional
//! import and delete against a live or fake service, checking each step
//! with an independent read and bounded polling.

mod check;
mod dependency;
mod lifecycle;
mod poll;

pub use check::{verify, AttributeCheck, Expectation, MemberRolesCheck, RemoteCheck};
pub use dependency::{
    ApiDependency, DeclareFn, Dependency, DependencyIds, EntityDependency, ExistingDependency,
};
pub use lifecycle::{steps, LifecycleReport, LifecycleScenario, StepReport};
pub use poll::{CheckFailure, PollPolicy, DEFAULT_ATTEMPTS, DEFAULT_INTERVAL};
