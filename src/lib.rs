// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # zitadel_reconcile
//!
//! Declarative, idempotent reconciliation of ZITADEL identity entities.
//!
//! ## Overview
//!
//! Entity instances are declared in a YAML file. The reconciler keeps a
//! recorded state of every instance it manages and drives the remote
//! service towards the declarations:
//!
//! - Create, read back, update in place or replace, and delete entities
//! - Import existing entities by their import key
//! - Refresh recorded state and report drift
//! - Verify a kind end to end with lifecycle scenarios
//!
//! ## Architecture
//!
//! 1. **Declared State**: the attributes written in the declaration file
//! 2. **Recorded State**: the last known state, kept in `.zitadel/state.json`
//! 3. **Remote State**: what the ZITADEL API reports
//!
//! The planner diffs declared against recorded state, and the driver runs
//! each action through the kind's adapter.
//!
//! ## Modules
//!
//! - [`config`]: Declaration parsing and validation
//! - [`resource`]: Declared state, kinds, import keys and the adapter contract
//! - [`kinds`]: Adapters for memberships, machine keys and identity providers
//! - [`driver`]: Create, read, update, delete and import for one kind
//! - [`zitadel`]: HTTP transport and scoped request context
//! - [`state`]: Recorded-state storage and locking
//! - [`planner`]: Diff computation, plans and plan execution
//! - [`reconciler`]: Plan, apply, refresh, import, destroy and drift
//! - [`harness`]: Lifecycle verification scenarios
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   domain: zitadel.example.com
//!   org_id: "170000000000000001"
//!
//! resources:
//!   - name: ci-viewer
//!     kind: zitadel_instance_member
//!     attributes:
//!       user_id: "170000000000000042"
//!       roles: [IAM_OWNER_VIEWER]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod harness;
pub mod kinds;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod state;
pub mod zitadel;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DeployConfig};
pub use driver::{ApplyAction, EntityDriver, Lifecycle};
pub use error::{Result, ZitadelError};
pub use harness::{LifecycleReport, LifecycleScenario};
pub use planner::{DeploymentPlan, DiffEngine, PlanExecutor};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use resource::{AttrValue, DeclaredState, ResourceKind};
pub use state::{DeploymentState, LocalStateStore, StateStore};
pub use zitadel::{ProviderContext, Transport, ZitadelClient};
