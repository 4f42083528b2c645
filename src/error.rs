//! Error types for the ZITADEL reconciliation system.
//!
//! This module provides the error hierarchy for every stage of an entity's
//! lifecycle: configuration, state persistence, the remote API, caller input,
//! reconciliation and lifecycle verification.

use std::path::PathBuf;
use thiserror::Error;

use crate::resource::{DeclaredState, Operation};

/// Placeholder shown in place of an identifier that has not been assigned.
pub const NOT_YET_CREATED: &str = "not yet created";

/// The main error type for the reconciliation system.
#[derive(Debug, Error)]
pub enum ZitadelError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Remote API errors.
    #[error("ZITADEL API error: {0}")]
    Api(#[from] ApiError),

    /// Caller input rejected before any remote call.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Lifecycle verification errors.
    #[error("Lifecycle check failed: {0}")]
    Harness(#[from] HarnessError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate resource name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// Unknown entity kind.
    #[error("Unknown resource kind: {kind}")]
    UnknownKind {
        /// The unrecognised type name.
        kind: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// A resource is not recorded in state.
    #[error("Resource '{name}' is not recorded in state")]
    UnknownResource {
        /// Name of the missing resource.
        name: String,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Writing the state file failed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors reported by the remote API or the transport in front of it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The addressed entity does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Message returned by the service.
        message: String,
    },

    /// The caller lacks permission for the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Message returned by the service.
        message: String,
    },

    /// The caller could not be authenticated.
    #[error("unauthenticated: {message}")]
    Unauthenticated {
        /// Message returned by the service.
        message: String,
    },

    /// The service rejected the request payload.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Message returned by the service.
        message: String,
    },

    /// The entity already exists.
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Message returned by the service.
        message: String,
    },

    /// Any other unsuccessful response.
    #[error("request failed with status {status}: {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// gRPC status code from the gateway body, if present.
        code: Option<i64>,
        /// Message returned by the service.
        message: String,
    },

    /// The service could not be reached.
    #[error("network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The ambient call context was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

/// Input rejected on the client side.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    /// A time-valued field is not RFC 3339.
    #[error("field '{field}': failed to parse time '{value}': {reason}")]
    InvalidTimestamp {
        /// Field name.
        field: String,
        /// The offending value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// An import key has the wrong number of segments.
    #[error("import key '{key}' has {found} segment(s), expected format {format}")]
    ImportKeyArity {
        /// The key as given.
        key: String,
        /// Documented format for the kind.
        format: String,
        /// Number of segments found.
        found: usize,
    },

    /// A required import key segment is empty.
    #[error("import key '{key}' has an empty '{field}' segment")]
    EmptyImportSegment {
        /// The key as given.
        key: String,
        /// Field of the empty segment.
        field: String,
    },

    /// A required field has no value.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field carries a value of the wrong type.
    #[error("field '{field}' expects {expected}, found {found}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Expected type.
        expected: String,
        /// Type found.
        found: String,
    },

    /// A field is not part of the kind's surface.
    #[error("unknown field '{field}' for {kind}")]
    UnknownField {
        /// Entity kind type name.
        kind: String,
        /// Field name.
        field: String,
    },

    /// A field carries a value the kind does not accept.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// An operation against one entity instance failed.
    #[error("{operation} of {kind} ({id}) failed: {source}")]
    OperationFailed {
        /// Entity kind type name.
        kind: &'static str,
        /// Identifier, or the not-yet-created placeholder.
        id: String,
        /// Operation that failed.
        operation: Operation,
        /// Underlying error.
        #[source]
        source: Box<ZitadelError>,
    },

    /// The remote mutation succeeded but recording its result did not.
    #[error(
        "{kind} ({id}) was changed remotely but field '{field}' could not be recorded: {reason}; declared and remote state may disagree"
    )]
    PartialApply {
        /// Entity kind type name.
        kind: &'static str,
        /// Identifier assigned by the remote mutation.
        id: String,
        /// Field that could not be recorded.
        field: String,
        /// Why recording failed.
        reason: String,
        /// Declared state as far as it could be recorded.
        recorded: Box<DeclaredState>,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Lifecycle verification errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A scenario step failed outright.
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        /// Step name.
        step: String,
        /// Underlying error.
        #[source]
        source: Box<ZitadelError>,
    },

    /// The remote value did not converge to the expected one.
    #[error("step '{step}': field '{field}' expected {expected}, got {actual}")]
    FieldMismatch {
        /// Step name.
        step: String,
        /// Field name.
        field: String,
        /// Expected value.
        expected: String,
        /// Observed value.
        actual: String,
    },

    /// The identifier does not have the generated-ID shape.
    #[error("step '{step}': identifier '{id}' does not match {pattern}")]
    IdFormat {
        /// Step name.
        step: String,
        /// Identifier observed.
        id: String,
        /// Expected pattern.
        pattern: String,
    },

    /// An update replaced the entity instead of changing it in place.
    #[error("step '{step}': identifier changed from {before} to {after}")]
    Recreated {
        /// Step name.
        step: String,
        /// Identifier before the step.
        before: String,
        /// Identifier after the step.
        after: String,
    },

    /// The polling window closed before the check passed.
    #[error("step '{step}': no convergence after {attempts} attempts: {last}")]
    Timeout {
        /// Step name.
        step: String,
        /// Attempts made.
        attempts: u32,
        /// Last check failure.
        last: String,
    },

    /// A scenario dependency could not be provisioned or removed.
    #[error("dependency '{dependency}': {source}")]
    Dependency {
        /// Dependency name.
        dependency: String,
        /// Underlying error.
        #[source]
        source: Box<ZitadelError>,
    },
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ZitadelError>;

impl ZitadelError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the innermost error, looking through operation wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Reconcile(ReconcileError::OperationFailed { source, .. })
            | Self::Harness(
                HarnessError::StepFailed { source, .. } | HarnessError::Dependency { source, .. },
            ) => source.root(),
            other => other,
        }
    }

    /// Returns true if the remote reported the entity as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::Api(ApiError::NotFound { .. }))
    }

    /// Returns true if the call context was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Api(ApiError::Cancelled))
    }

    /// Returns true if the input was rejected before reaching the service.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self.root(), Self::Input(_))
    }
}

impl ApiError {
    /// Returns true for the absence-of-entity classification.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the failure happened before a response was received.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ReconcileError {
    /// Wraps an error with the entity kind, identifier and operation it belongs to.
    ///
    /// Partial-apply errors already carry that context and pass through unchanged.
    #[must_use]
    pub fn wrap(kind: &'static str, id: &str, operation: Operation, err: ZitadelError) -> ZitadelError {
        if matches!(err, ZitadelError::Reconcile(Self::PartialApply { .. })) {
            return err;
        }
        ZitadelError::Reconcile(Self::OperationFailed {
            kind,
            id: display_id(id).to_string(),
            operation,
            source: Box::new(err),
        })
    }
}

/// Renders an identifier for messages.
#[must_use]
pub fn display_id(id: &str) -> &str {
    if id.is_empty() { NOT_YET_CREATED } else { id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_error_names_kind_id_and_operation() {
        let err = ReconcileError::wrap(
            "zitadel_org_member",
            "",
            Operation::Create,
            ApiError::PermissionDenied {
                message: String::from("missing org.member.write"),
            }
            .into(),
        );

        let rendered = err.to_string();
        assert!(rendered.contains("zitadel_org_member"));
        assert!(rendered.contains(NOT_YET_CREATED));
        assert!(rendered.contains("create"));
        assert!(rendered.contains("missing org.member.write"));
    }

    #[test]
    fn test_classification_looks_through_wrappers() {
        let err = ReconcileError::wrap(
            "zitadel_machine_key",
            "123",
            Operation::Read,
            ApiError::NotFound {
                message: String::from("key"),
            }
            .into(),
        );
        assert!(err.is_not_found());
        assert!(!err.is_input_error());

        let input = ReconcileError::wrap(
            "zitadel_machine_key",
            "",
            Operation::Create,
            InputError::MissingField {
                field: String::from("user_id"),
            }
            .into(),
        );
        assert!(input.is_input_error());
    }

    #[test]
    fn test_partial_apply_is_not_rewrapped() {
        let partial: ZitadelError = ReconcileError::PartialApply {
            kind: "zitadel_machine_key",
            id: String::from("42"),
            field: String::from("key_details"),
            reason: String::from("bad base64"),
            recorded: Box::default(),
        }
        .into();

        let wrapped = ReconcileError::wrap("zitadel_machine_key", "", Operation::Create, partial);
        assert!(matches!(
            wrapped,
            ZitadelError::Reconcile(ReconcileError::PartialApply { .. })
        ));
    }
}
