//! Wire messages of the management and admin gateways.
//!
//! Field names follow the gateway's JSON mapping (lower camel case).

use serde::{Deserialize, Serialize};

/// Change metadata attached to most responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDetails {
    /// Event sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    /// Last change timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_date: Option<String>,
    /// Organization (or instance) that owns the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_owner: Option<String>,
}

/// Response carrying only change metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsResponse {
    /// Change metadata.
    #[serde(default)]
    pub details: ObjectDetails,
}

// ----------------------------------------------------------------------------
// Machine keys
// ----------------------------------------------------------------------------

/// `POST /management/v1/users/{user_id}/keys`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMachineKeyRequest {
    /// Key type, e.g. `KEY_TYPE_JSON`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// RFC 3339 expiration, service default when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    /// Base64-encoded public key, service generates a pair when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Response to [`AddMachineKeyRequest`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMachineKeyResponse {
    /// Assigned key ID.
    pub key_id: String,
    /// Base64-encoded key material, only returned here.
    #[serde(default)]
    pub key_details: Option<String>,
    /// Change metadata.
    #[serde(default)]
    pub details: ObjectDetails,
}

/// A machine key as the service reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineKey {
    /// Key ID.
    pub id: String,
    /// Key type.
    #[serde(rename = "type", default)]
    pub key_type: String,
    /// RFC 3339 expiration.
    #[serde(default)]
    pub expiration_date: Option<String>,
    /// Change metadata.
    #[serde(default)]
    pub details: ObjectDetails,
}

/// `GET /management/v1/users/{user_id}/keys/{key_id}`
#[derive(Debug, Clone, Deserialize)]
pub struct GetMachineKeyResponse {
    /// The key.
    pub key: MachineKey,
}

// ----------------------------------------------------------------------------
// Members
// ----------------------------------------------------------------------------

/// Adds a member with roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    /// Member's user ID.
    pub user_id: String,
    /// Granted roles.
    pub roles: Vec<String>,
}

/// Replaces a member's roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateMemberRequest {
    /// Granted roles.
    pub roles: Vec<String>,
}

/// Member search restricted to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListMembersRequest {
    /// Search queries, combined with AND.
    pub queries: Vec<MemberQuery>,
}

/// One member search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuery {
    /// Match on user ID.
    pub user_id_query: UserIdQuery,
}

/// User ID match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdQuery {
    /// User ID to match.
    pub user_id: String,
}

/// A member as the service reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Member's user ID.
    pub user_id: String,
    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Change metadata.
    #[serde(default)]
    pub details: ObjectDetails,
}

/// Response of a member search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMembersResponse {
    /// Matching members.
    #[serde(default)]
    pub result: Vec<Member>,
}

impl ListMembersRequest {
    /// Search for exactly one user.
    #[must_use]
    pub fn for_user(user_id: &str) -> Self {
        Self {
            queries: vec![MemberQuery {
                user_id_query: UserIdQuery {
                    user_id: user_id.to_string(),
                },
            }],
        }
    }
}

// ----------------------------------------------------------------------------
// Identity providers
// ----------------------------------------------------------------------------

/// Linking and provisioning behaviour shared by every provider type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOptions {
    /// Users may link existing accounts.
    #[serde(default)]
    pub is_linking_allowed: bool,
    /// Users may create accounts through the provider.
    #[serde(default)]
    pub is_creation_allowed: bool,
    /// Accounts are created automatically on first login.
    #[serde(default)]
    pub is_auto_creation: bool,
    /// Account fields are refreshed on every login.
    #[serde(default)]
    pub is_auto_update: bool,
}

/// Add or update request for any provider type.
///
/// The type-specific settings are flattened next to the shared fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest<S> {
    /// Display name.
    pub name: String,
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Linking and provisioning options.
    pub provider_options: ProviderOptions,
    /// Type-specific settings.
    #[serde(flatten)]
    pub settings: S,
}

/// Response to adding a provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddProviderResponse {
    /// Assigned provider ID.
    pub id: String,
    /// Change metadata.
    #[serde(default)]
    pub details: ObjectDetails,
}

/// `GET {root}/idps/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct GetProviderResponse {
    /// The provider.
    pub idp: Provider,
}

/// A provider as the service reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Provider ID.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Change metadata.
    #[serde(default)]
    pub details: ObjectDetails,
    /// Options plus exactly one type-specific configuration.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// Fields every type-specific configuration reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderClientConfig {
    /// OAuth client ID.
    #[serde(default)]
    pub client_id: String,
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}
