//! Machine keys: key pair credentials of a machine user.
//!
//! Every field is immutable once the key exists; a changed field means a
//! new key. The key material is only returned on creation.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use tracing::{debug, info};

use crate::error::{InputError, ReconcileError, Result};
use crate::resource::{
    absent_ok, has_changes, DeclaredState, FieldSpec, FieldType, ImportFormat, ImportSegment,
    ReadOutcome, Resource, ResourceKind,
};
use crate::zitadel::types::{AddMachineKeyRequest, AddMachineKeyResponse, GetMachineKeyResponse};
use crate::zitadel::{ProviderContext, ORG_ID_FIELD};

/// Owning machine user.
pub const USER_ID: &str = "user_id";
/// Key format.
pub const KEY_TYPE: &str = "key_type";
/// RFC 3339 expiration.
pub const EXPIRATION_DATE: &str = "expiration_date";
/// PEM public key supplied by the caller.
pub const PUBLIC_KEY: &str = "public_key";
/// Key file returned on creation.
pub const KEY_DETAILS: &str = "key_details";

/// Key types the service accepts.
pub const KEY_TYPES: &[&str] = &["KEY_TYPE_JSON"];

/// Field surface.
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::optional(ORG_ID_FIELD, FieldType::String).forces_new(),
    FieldSpec::required(USER_ID, FieldType::String).forces_new(),
    FieldSpec::required(KEY_TYPE, FieldType::String).forces_new(),
    FieldSpec::optional_computed(EXPIRATION_DATE, FieldType::String).forces_new(),
    FieldSpec::optional(PUBLIC_KEY, FieldType::String).forces_new(),
    FieldSpec::computed(KEY_DETAILS, FieldType::String).secret(),
];

/// `<id:user_id[:org_id]>`
pub const IMPORT: &ImportFormat = &ImportFormat::new(&[
    ImportSegment::required("id"),
    ImportSegment::required(USER_ID),
    ImportSegment::optional(ORG_ID_FIELD),
]);

/// Parses an RFC 3339 timestamp field.
///
/// # Errors
///
/// Returns [`InputError::InvalidTimestamp`] naming the field and value.
pub fn parse_timestamp(field: &str, value: &str) -> std::result::Result<DateTime<FixedOffset>, InputError> {
    DateTime::parse_from_rfc3339(value).map_err(|e| InputError::InvalidTimestamp {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Checks declared state the way create would, without any remote call.
///
/// # Errors
///
/// Returns the first input error create would report.
pub fn validate(state: &DeclaredState) -> std::result::Result<(), InputError> {
    MachineKeySpec::from_state(state).map(|_| ())
}

/// Validated create input.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MachineKeySpec {
    user_id: String,
    key_type: String,
    expiration_date: Option<DateTime<FixedOffset>>,
    public_key: Option<String>,
}

impl MachineKeySpec {
    fn from_state(state: &DeclaredState) -> std::result::Result<Self, InputError> {
        let user_id = state.str_required(USER_ID)?.to_string();

        let key_type = state.str_required(KEY_TYPE)?;
        if !KEY_TYPES.contains(&key_type) {
            return Err(InputError::InvalidValue {
                field: KEY_TYPE.to_string(),
                message: format!("'{key_type}' is not one of {}", KEY_TYPES.join(", ")),
            });
        }

        let expiration_date = state
            .str_opt(EXPIRATION_DATE)?
            .filter(|raw| !raw.is_empty())
            .map(|raw| parse_timestamp(EXPIRATION_DATE, raw))
            .transpose()?;

        let public_key = state
            .str_opt(PUBLIC_KEY)?
            .filter(|pem| !pem.is_empty())
            .map(String::from);

        Ok(Self {
            user_id,
            key_type: key_type.to_string(),
            expiration_date,
            public_key,
        })
    }

    fn to_request(&self) -> AddMachineKeyRequest {
        AddMachineKeyRequest {
            key_type: self.key_type.clone(),
            expiration_date: self.expiration_date.map(|at| at.to_rfc3339()),
            public_key: self.public_key.as_ref().map(|pem| STANDARD.encode(pem)),
        }
    }
}

fn keys_path(user_id: &str) -> String {
    format!("/management/v1/users/{user_id}/keys")
}

fn key_path(user_id: &str, key_id: &str) -> String {
    format!("/management/v1/users/{user_id}/keys/{key_id}")
}

/// Adapter for [`ResourceKind::MachineKey`].
#[derive(Debug, Clone)]
pub struct MachineKeyAdapter {
    ctx: ProviderContext,
}

impl MachineKeyAdapter {
    /// Creates the adapter.
    #[must_use]
    pub const fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Resource for MachineKeyAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::MachineKey
    }

    async fn create(&self, declared: &DeclaredState) -> Result<DeclaredState> {
        let spec = MachineKeySpec::from_state(declared)?;
        let scoped = self.ctx.org_scope(declared);

        let response: AddMachineKeyResponse = scoped
            .post(&keys_path(&spec.user_id), &spec.to_request())
            .await?;
        info!("Created machine key {} for user {}", response.key_id, spec.user_id);

        let mut state = declared.clone().with_id(response.key_id.clone());

        if let Some(encoded) = response.key_details {
            let decoded = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| e.to_string())
                .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));

            match decoded {
                Ok(details) => state.set(KEY_DETAILS, details),
                Err(reason) => {
                    return Err(ReconcileError::PartialApply {
                        kind: ResourceKind::MachineKey.type_name(),
                        id: response.key_id,
                        field: KEY_DETAILS.to_string(),
                        reason,
                        recorded: Box::new(state),
                    }
                    .into());
                }
            }
        }

        Ok(state)
    }

    async fn read(&self, declared: &DeclaredState) -> Result<ReadOutcome> {
        let user_id = declared.str_required(USER_ID)?;
        let scoped = self.ctx.org_scope(declared);

        let response: GetMachineKeyResponse = match scoped.get(&key_path(user_id, declared.id())).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!("Machine key {} no longer exists", declared.id());
                return Ok(ReadOutcome::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let key = response.key;
        let mut state = declared.clone().with_id(key.id);
        if !key.key_type.is_empty() {
            state.set(KEY_TYPE, key.key_type);
        }

        if let Some(remote) = key.expiration_date {
            let same_instant = match (declared.str_opt(EXPIRATION_DATE)?, parse_timestamp(EXPIRATION_DATE, &remote)) {
                (Some(local), Ok(remote_at)) => {
                    parse_timestamp(EXPIRATION_DATE, local).is_ok_and(|local_at| local_at == remote_at)
                }
                _ => false,
            };
            if !same_instant {
                state.set(EXPIRATION_DATE, remote);
            }
        }

        Ok(ReadOutcome::Found(state))
    }

    async fn update(&self, prior: &DeclaredState, planned: &DeclaredState) -> Result<DeclaredState> {
        let kind = self.kind();
        if !has_changes(kind, prior, planned) {
            return Ok(planned.clone());
        }

        let field = kind
            .changed_fields(prior, planned)
            .first()
            .map_or(USER_ID, |f| f.name);
        Err(InputError::InvalidValue {
            field: field.to_string(),
            message: String::from("machine keys cannot be changed in place"),
        }
        .into())
    }

    async fn delete(&self, declared: &DeclaredState) -> Result<()> {
        let user_id = declared.str_required(USER_ID)?;
        let scoped = self.ctx.org_scope(declared);

        absent_ok(scoped.delete(&key_path(user_id, declared.id())).await)?;
        info!("Deleted machine key {}", declared.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ZitadelError};
    use crate::zitadel::{HttpMethod, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn adapter(mock: MockTransport) -> MachineKeyAdapter {
        MachineKeyAdapter::new(ProviderContext::new(Arc::new(mock)))
    }

    fn declared() -> DeclaredState {
        DeclaredState::new()
            .with(ORG_ID_FIELD, "100")
            .with(USER_ID, "200")
            .with(KEY_TYPE, "KEY_TYPE_JSON")
            .with(EXPIRATION_DATE, "2519-04-01T08:45:00+00:00")
    }

    #[tokio::test]
    async fn test_bad_timestamp_rejected_before_any_call() {
        let mut mock = MockTransport::new();
        mock.expect_send().never();

        let bad = declared().with(EXPIRATION_DATE, "tomorrow");
        let err = adapter(mock).create(&bad).await.expect_err("should reject");

        assert!(matches!(
            err,
            ZitadelError::Input(InputError::InvalidTimestamp { ref field, ref value, .. })
                if field == EXPIRATION_DATE && value == "tomorrow"
        ));
    }

    #[tokio::test]
    async fn test_create_records_id_and_key_details() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|call| {
                call.method == HttpMethod::Post
                    && call.path == "/management/v1/users/200/keys"
                    && call.org_id.as_deref() == Some("100")
            })
            .times(1)
            .returning(|_| {
                Ok(json!({
                    "keyId": "300",
                    "keyDetails": STANDARD.encode(r#"{"type":"serviceaccount"}"#),
                }))
            });

        let state = adapter(mock).create(&declared()).await.expect("create");
        assert_eq!(state.id(), "300");
        assert_eq!(state.str_opt(KEY_DETAILS), Ok(Some(r#"{"type":"serviceaccount"}"#)));
    }

    #[tokio::test]
    async fn test_undecodable_key_details_is_partial_apply() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .returning(|_| Ok(json!({"keyId": "300", "keyDetails": "%%%"})));

        let err = adapter(mock).create(&declared()).await.expect_err("partial");
        match err {
            ZitadelError::Reconcile(ReconcileError::PartialApply { id, recorded, .. }) => {
                assert_eq!(id, "300");
                assert_eq!(recorded.id(), "300");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_read_keeps_declared_timestamp_for_same_instant() {
        let mut mock = MockTransport::new();
        mock.expect_send().returning(|_| {
            Ok(json!({"key": {
                "id": "300",
                "type": "KEY_TYPE_JSON",
                "expirationDate": "2519-04-01T08:45:00Z",
            }}))
        });

        let prior = declared().with_id("300").with(KEY_DETAILS, "secret");
        let ReadOutcome::Found(state) = adapter(mock).read(&prior).await.expect("read") else {
            panic!("key should be found");
        };
        assert_eq!(state, prior);
    }

    #[tokio::test]
    async fn test_read_absent_key() {
        let mut mock = MockTransport::new();
        mock.expect_send().returning(|_| {
            Err(ApiError::NotFound {
                message: String::from("Errors.User.Key.NotFound"),
            })
        });

        let outcome = adapter(mock).read(&declared().with_id("300")).await.expect("read");
        assert_eq!(outcome, ReadOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_update_without_changes_makes_no_call() {
        let mut mock = MockTransport::new();
        mock.expect_send().never();

        let prior = declared().with_id("300");
        let moved = prior.clone().with(ORG_ID_FIELD, "101");
        let state = adapter(mock).update(&prior, &moved).await.expect("no-op");
        assert_eq!(state.id(), "300");
    }

    #[tokio::test]
    async fn test_delete_of_absent_key_succeeds() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|call| call.method == HttpMethod::Delete)
            .returning(|_| {
                Err(ApiError::NotFound {
                    message: String::from("gone"),
                })
            });

        adapter(mock).delete(&declared().with_id("300")).await.expect("delete");
    }
}
