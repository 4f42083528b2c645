//! Command-line interface of `zitadel-reconcile`.
//!
//! Argument parsing lives in `commands`; rendering of plans, reports and
//! state for the terminal or for scripts lives in `output`.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::{MessageLevel, OutputFormatter};
