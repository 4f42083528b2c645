//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{DeployConfig, ValidationResult};
use crate::planner::{ActionStatus, ActionType, DeploymentPlan, DiffResult, DiffType, ExecutionResult, SENSITIVE};
use crate::reconciler::{DriftReport, ReconciliationResult, RefreshReport};
use crate::resource::{DeclaredState, Presence, ResourceKind};
use crate::state::{DeploymentState, LockInfo};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Recorded instance row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Lifecycle")]
    lifecycle: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Field row for the kinds listing.
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    name: String,
    #[tabled(rename = "Type")]
    field_type: String,
    #[tabled(rename = "Presence")]
    presence: String,
    #[tabled(rename = "Flags")]
    flags: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, config: &DeployConfig, show_warnings: bool) -> String {
        if self.format == OutputFormat::Json {
            return to_json(&ValidationJson {
                valid: result.is_valid(),
                errors: result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect(),
                warnings: result.warnings.clone(),
                resources: config.resources.len(),
            });
        }

        let mut output = String::new();
        if result.is_valid() {
            let _ = writeln!(output, "{} Declarations are valid", "✓".green());
        } else {
            let _ = writeln!(output, "{} {} error(s):", "✗".red(), result.error_count());
            for error in &result.errors {
                let _ = writeln!(output, "   - {}: {}", error.field.bold(), error.message);
            }
        }

        if show_warnings && !result.warnings.is_empty() {
            let _ = writeln!(output, "\n{} {} warning(s):", "⚠".yellow(), result.warning_count());
            for warning in &result.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        let _ = writeln!(output, "\nDeclaration summary:");
        let _ = writeln!(output, "   Instance: {}", config.provider.base_url());
        let _ = writeln!(output, "   Resources: {}", config.resources.len());
        output
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, diff: &DiffResult, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::new(plan, diff)),
            OutputFormat::Text => Self::format_plan_text(plan, diff, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan, diff: &DiffResult, detailed: bool) -> String {
        if plan.is_empty() {
            return format!("{} No changes. Remote entities match the declarations.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = write!(output, "\nPlan\n");
        let _ = write!(output, "   Declaration hash: {}\n\n", short(&plan.config_hash));

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type, a.replacing),
                resource: a.resource_name.clone(),
                kind: a.kind.to_string(),
                reason: truncate(&a.reason, 48),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for d in diff.actionable_diffs() {
                let _ = writeln!(output, "\n  {} ({}):", d.name.bold(), d.diff_type);
                for detail in &d.details {
                    let line = if detail.forces_new { detail.to_string().red() } else { detail.to_string().normal() };
                    let _ = writeln!(output, "      {line}");
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to destroy\n",
            diff.creates.to_string().green(),
            diff.updates.to_string().yellow(),
            diff.replaces.to_string().yellow(),
            diff.deletes.to_string().red()
        );
        output
    }

    /// Formats an apply result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Apply complete", "✓".green())
                } else {
                    format!("{} Apply failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        if self.format == OutputFormat::Json {
            return to_json(report);
        }

        let mut output = format!("{} Refreshed {} instance(s)\n", "✓".green(), report.refreshed);
        for drifted in &report.drifted {
            let _ = writeln!(output, "   ~ {} changed remotely: {}", drifted.name, drifted.fields.join(", "));
        }
        for name in &report.gone {
            let _ = writeln!(output, "   - {name} no longer exists and will be recreated");
        }
        output
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - state is converged.\n", "✓".green());
                }

                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                for resource in &report.drifted_resources {
                    let _ = writeln!(
                        output,
                        "   ~ {} ({}): {}",
                        resource.name,
                        resource.kind,
                        resource.fields.join(", ")
                    );
                }
                for name in &report.gone {
                    let _ = writeln!(output, "   - {name}: deleted outside this tool");
                }
                for name in &report.pending {
                    let _ = writeln!(output, "   * {name}: declared changes not applied");
                }
                let _ = write!(
                    output,
                    "\n{} of {} declared resource(s) affected.\n",
                    report.drifted_resources.len() + report.gone.len(),
                    report.total_resources
                );
                output
            }
        }
    }

    /// Formats an imported entity.
    #[must_use]
    pub fn format_import(&self, name: &str, kind: ResourceKind, state: &DeclaredState) -> String {
        let masked = masked(kind, state);
        if self.format == OutputFormat::Json {
            return to_json(&serde_json::json!({ "name": name, "kind": kind, "state": masked }));
        }

        let mut output = format!("{} Imported {kind} '{name}' ({})\n", "✓".green(), state.id());
        for (field, value) in masked.attributes() {
            let _ = writeln!(output, "   {field} = {value}");
        }
        output
    }

    /// Formats a destroy run.
    #[must_use]
    pub fn format_destroy(&self, result: &ExecutionResult) -> String {
        if self.format == OutputFormat::Json {
            let actions: Vec<ActionJson> = result
                .results
                .iter()
                .map(|r| ActionJson {
                    action_type: r.action.action_type.to_string(),
                    resource: r.action.resource_name.clone(),
                    kind: r.action.kind.to_string(),
                    reason: match &r.status {
                        ActionStatus::Succeeded => String::from("succeeded"),
                        ActionStatus::Failed { error } => error.clone(),
                        ActionStatus::Skipped => String::from("skipped"),
                    },
                })
                .collect();
            return to_json(&serde_json::json!({ "success": result.success, "actions": actions }));
        }

        let mut output = String::new();
        for r in &result.results {
            let line = match &r.status {
                ActionStatus::Succeeded => format!("{} {}", "✓".green(), r.action.description()),
                ActionStatus::Failed { error } => format!("{} {}: {error}", "✗".red(), r.action.description()),
                ActionStatus::Skipped => format!("{} {} (skipped)", "-".dimmed(), r.action.description()),
            };
            let _ = writeln!(output, "   {line}");
        }
        let _ = writeln!(output, "\n{result}");
        output
    }

    /// Formats the supported kinds.
    #[must_use]
    pub fn format_kinds(&self, kinds: &[ResourceKind]) -> String {
        if self.format == OutputFormat::Json {
            let listed: Vec<KindJson> = kinds.iter().map(|k| KindJson::from(*k)).collect();
            return to_json(&listed);
        }

        let mut output = String::new();
        for kind in kinds {
            let _ = writeln!(output, "\n{} ({} scope)", kind.type_name().bold(), kind.scope());
            let _ = writeln!(output, "   Import key: {}", kind.import_format().describe());

            let rows: Vec<FieldRow> = kind
                .fields()
                .iter()
                .map(|f| {
                    let mut flags = Vec::new();
                    if f.force_new {
                        flags.push("forces replacement");
                    }
                    if f.sensitive {
                        flags.push("sensitive");
                    }
                    FieldRow {
                        name: f.name.to_string(),
                        field_type: f.field_type.to_string(),
                        presence: presence_name(f.presence).to_string(),
                        flags: flags.join(", "),
                    }
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }
        output
    }

    /// Formats recorded state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState) -> String {
        if self.format == OutputFormat::Json {
            let mut shown = state.clone();
            for record in shown.resources.values_mut() {
                record.state = masked(record.kind, &record.state);
            }
            return to_json(&shown);
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nState");
        let _ = writeln!(output, "   Version: {}", state.version);
        let _ = writeln!(output, "   Declaration hash: {}", short(&state.config_hash));
        let _ = writeln!(output, "   Last updated: {}", state.last_updated);
        let _ = writeln!(output, "   Resources: {}\n", state.resources.len());

        if !state.resources.is_empty() {
            let rows: Vec<RecordRow> = state
                .resources
                .values()
                .map(|r| RecordRow {
                    name: r.name.clone(),
                    kind: r.kind.to_string(),
                    id: crate::error::display_id(r.id()).to_string(),
                    lifecycle: r.lifecycle().to_string(),
                    updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !state.history.is_empty() {
            let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
            for entry in state.history.iter().rev().take(5) {
                let status = if entry.success { "✓".green() } else { "✗".red() };
                let _ = writeln!(
                    output,
                    "     {status} {} - {} ({})",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.resources.join(", ")
                );
            }
        }

        output
    }

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => to_json(lock),
            OutputFormat::Text => format!("{} {lock}\n", "🔒".yellow()),
        }
    }

    /// Formats a one-line status message.
    #[must_use]
    pub fn message(&self, level: MessageLevel, message: &str) -> String {
        if self.format == OutputFormat::Json {
            return to_json(&serde_json::json!({ "status": level.name(), "message": message }));
        }

        let icon = match level {
            MessageLevel::Success => "✓".green(),
            MessageLevel::Warning => "⚠".yellow(),
            MessageLevel::Error => "✗".red(),
        };
        format!("{icon} {message}")
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType, replacing: bool) -> String {
        match (action_type, replacing) {
            (ActionType::Create, false) => "+create".green().to_string(),
            (ActionType::Create, true) => "+replace".yellow().to_string(),
            (ActionType::Update, _) => "~update".yellow().to_string(),
            (ActionType::Delete, true) => "-replace".yellow().to_string(),
            (ActionType::Delete, false) => "-delete".red().to_string(),
        }
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Operation succeeded.
    Success,
    /// Something needs attention.
    Warning,
    /// Operation failed.
    Error,
}

impl MessageLevel {
    const fn name(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Declared state with sensitive values replaced by a placeholder.
fn masked(kind: ResourceKind, state: &DeclaredState) -> DeclaredState {
    let mut shown = state.clone();
    for field in kind.sensitive_fields() {
        if shown.is_set(field) {
            shown.set(field, SENSITIVE);
        }
    }
    shown
}

const fn presence_name(presence: Presence) -> &'static str {
    match presence {
        Presence::Required => "required",
        Presence::Optional => "optional",
        Presence::Computed => "computed",
        Presence::OptionalComputed => "optional, computed",
    }
}

fn short(hash: &str) -> &str {
    if hash.is_empty() {
        return "(none)";
    }
    hash.get(..8).unwrap_or(hash)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
    resources: usize,
}

#[derive(Serialize)]
struct PlanJson {
    config_hash: String,
    creates: usize,
    updates: usize,
    replaces: usize,
    deletes: usize,
    unchanged: usize,
    actions: Vec<ActionJson>,
    changes: Vec<ChangeJson>,
}

#[derive(Serialize)]
struct ActionJson {
    action_type: String,
    resource: String,
    kind: String,
    reason: String,
}

#[derive(Serialize)]
struct ChangeJson {
    resource: String,
    change: String,
    field: String,
    old_value: Option<String>,
    new_value: Option<String>,
    forces_new: bool,
}

impl PlanJson {
    fn new(plan: &DeploymentPlan, diff: &DiffResult) -> Self {
        Self {
            config_hash: plan.config_hash.clone(),
            creates: diff.creates,
            updates: diff.updates,
            replaces: diff.replaces,
            deletes: diff.deletes,
            unchanged: diff.unchanged,
            actions: plan
                .actions
                .iter()
                .map(|a| ActionJson {
                    action_type: a.action_type.to_string(),
                    resource: a.resource_name.clone(),
                    kind: a.kind.to_string(),
                    reason: a.reason.clone(),
                })
                .collect(),
            changes: diff
                .diffs
                .iter()
                .filter(|d| d.diff_type != DiffType::NoChange)
                .flat_map(|d| {
                    d.details.iter().map(|detail| ChangeJson {
                        resource: d.name.clone(),
                        change: d.diff_type.to_string(),
                        field: detail.field.clone(),
                        old_value: detail.old_value.clone(),
                        new_value: detail.new_value.clone(),
                        forces_new: detail.forces_new,
                    })
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct KindJson {
    kind: &'static str,
    scope: String,
    import_key: String,
    fields: Vec<crate::resource::FieldSpec>,
}

impl From<ResourceKind> for KindJson {
    fn from(kind: ResourceKind) -> Self {
        Self {
            kind: kind.type_name(),
            scope: kind.scope().to_string(),
            import_key: kind.import_format().describe(),
            fields: kind.fields().to_vec(),
        }
    }
}
