//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::resource::ResourceKind;

/// Declarative reconciliation of ZITADEL entities.
#[derive(Parser, Debug)]
#[command(name = "zitadel-reconcile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the declaration file.
    #[arg(short, long, global = true, env = "ZITADEL_RECONCILE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the declaration file without contacting the service.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what apply would change.
    Plan {
        /// Show field-level differences.
        #[arg(short, long)]
        detailed: bool,

        /// Plan against recorded state without reading it back first.
        #[arg(long)]
        no_refresh: bool,
    },

    /// Create, update and delete entities to match the declarations.
    Apply {
        /// Skip the plan summary.
        #[arg(short, long)]
        yes: bool,

        /// Continue past failed actions.
        #[arg(long)]
        continue_on_error: bool,

        /// Apply against recorded state without reading it back first.
        #[arg(long)]
        no_refresh: bool,
    },

    /// Read every recorded entity back from the service.
    Refresh,

    /// Adopt an existing entity under a declared name.
    Import {
        /// Declared name to record the entity under.
        name: String,

        /// Entity kind, e.g. `zitadel_org_member`.
        kind: ResourceKind,

        /// Import key in the kind's format (see `kinds`).
        key: String,
    },

    /// Delete every recorded entity.
    Destroy {
        /// Confirm the deletion.
        #[arg(short, long)]
        yes: bool,
    },

    /// Report entities changed outside this tool.
    Drift,

    /// List supported entity kinds with their fields and import formats.
    Kinds {
        /// Show only this kind.
        kind: Option<ResourceKind>,
    },

    /// Manage recorded state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show recorded state.
    Show,

    /// Lock the state.
    Lock {
        /// Operation recorded with the lock.
        #[arg(long, default_value = "manual")]
        operation: String,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to release.
        #[arg(long)]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_parses_kind() {
        let cli = Cli::try_parse_from([
            "zitadel-reconcile",
            "import",
            "viewer",
            "zitadel_project_member",
            "7:42",
        ])
        .expect("parses");

        match cli.command {
            Commands::Import { name, kind, key } => {
                assert_eq!(name, "viewer");
                assert_eq!(kind, ResourceKind::ProjectMember);
                assert_eq!(key, "7:42");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = Cli::try_parse_from(["zitadel-reconcile", "kinds", "zitadel_user"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_output_flag() {
        let cli = Cli::try_parse_from(["zitadel-reconcile", "plan", "--output", "json", "--no-refresh"])
            .expect("parses");
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Plan { no_refresh: true, .. }));
    }
}
