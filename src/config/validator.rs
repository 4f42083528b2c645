//! Declaration validation.
//!
//! Every declared instance is checked against its kind's field surface and
//! the input rules create would apply, so bad input is reported before any
//! remote call. Problems that do not block an apply are collected as
//! warnings.

use chrono::Utc;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::kinds::machine_key::{parse_timestamp, EXPIRATION_DATE};
use crate::kinds::validate_declared;
use crate::resource::{Presence, ResourceKind, Scope};
use crate::zitadel::ORG_ID_FIELD;

use super::spec::{DeployConfig, ProviderSettings, ResourceConfig};

/// Validator for declaration files.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing everything found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Blocking problems.
    pub errors: Vec<ValidationError>,
    /// Non-blocking problems.
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Path of the offending value.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a declaration file.
    ///
    /// # Errors
    ///
    /// Returns the first error if any were found; every error and warning
    /// is available through [`ConfigValidator::check`].
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first) = result.errors.first() {
            return Err(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            }
            .into());
        }

        debug!("Declaration validation passed with {} warning(s)", result.warnings.len());
        Ok(result)
    }

    /// Collects every error and warning in a declaration file.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_provider(&config.provider, &mut result);

        if config.state.path.as_os_str().is_empty() {
            result.error("state.path", "State path cannot be empty");
        }

        let mut seen = HashSet::new();
        for (index, resource) in config.resources.iter().enumerate() {
            let path = format!("resources[{index}]");

            if !is_valid_name(&resource.name) {
                result.error(
                    format!("{path}.name"),
                    format!(
                        "Name '{}' is invalid. Must be lowercase alphanumeric with hyphens or underscores.",
                        resource.name
                    ),
                );
            } else if !seen.insert(resource.name.as_str()) {
                result.error(
                    format!("{path}.name"),
                    ConfigError::DuplicateName {
                        name: resource.name.clone(),
                    }
                    .to_string(),
                );
            }

            Self::validate_resource(&config.provider, resource, &path, &mut result);
        }

        result
    }

    fn validate_provider(provider: &ProviderSettings, result: &mut ValidationResult) {
        if provider.domain.is_empty() {
            result.error("provider.domain", "Domain cannot be empty");
        } else if provider.domain.contains("://") || provider.domain.contains('/') {
            result.error(
                "provider.domain",
                format!("Domain '{}' must be a bare host name without scheme or path", provider.domain),
            );
        }

        if provider.timeout_secs == 0 {
            result.error("provider.timeout_secs", "Timeout must be at least 1 second");
        }

        if provider.insecure {
            result.warn("provider.insecure is set; the access token is sent over plain HTTP");
        }
    }

    fn validate_resource(
        provider: &ProviderSettings,
        resource: &ResourceConfig,
        path: &str,
        result: &mut ValidationResult,
    ) {
        let kind = resource.kind;
        let state = resource.declared_state();
        let before = result.errors.len();

        for (name, value) in state.attributes() {
            let field_path = format!("{path}.attributes.{name}");
            match kind.field(name) {
                None => result.error(
                    field_path,
                    format!("Unknown field '{name}' for {kind}; accepted: {}", field_names(kind)),
                ),
                Some(field) if field.presence == Presence::Computed => {
                    result.error(field_path, format!("'{name}' is assigned by the service and cannot be set"));
                }
                Some(field) if !field.field_type.accepts(value) => result.error(
                    field_path,
                    format!("'{name}' expects {}, found {}", field.field_type, value.type_name()),
                ),
                Some(_) => {}
            }
        }

        for field in kind.fields().iter().filter(|f| f.is_required()) {
            if !state.is_set(field.name) {
                result.error(
                    format!("{path}.attributes.{}", field.name),
                    format!("Missing required field '{}' for {kind}", field.name),
                );
            }
        }

        // Surface checks first; the kind checks assume well-typed input.
        if result.errors.len() == before
            && let Err(e) = validate_declared(kind, &state)
        {
            result.error(format!("{path}.attributes"), e.to_string());
        }

        if kind == ResourceKind::MachineKey
            && let Ok(Some(raw)) = state.str_opt(EXPIRATION_DATE)
            && let Ok(at) = parse_timestamp(EXPIRATION_DATE, raw)
            && at < Utc::now()
        {
            result.warn(format!("{path}: expiration_date {raw} is in the past; the service will reject it"));
        }

        if kind.scope() == Scope::Organization
            && kind.field(ORG_ID_FIELD).is_some()
            && !state.is_set(ORG_ID_FIELD)
            && provider.org_id.is_none()
        {
            result.warn(format!(
                "{path}: no org_id and no provider.org_id; the token's own organization applies"
            ));
        }
    }
}

fn field_names(kind: ResourceKind) -> String {
    kind.fields()
        .iter()
        .filter(|f| f.presence != Presence::Computed)
        .map(|f| f.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Names start with a lowercase letter and use lowercase letters, digits,
/// hyphens and underscores.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && !name.ends_with(['-', '_'])
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
