//! Organization-level GitHub Enterprise Server provider.

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::resource::{DeclaredState, FieldSpec, FieldType, ImportFormat, ImportSegment, ResourceKind, Scope};
use crate::zitadel::ORG_ID_FIELD;

use super::{
    IdpFlavor, CLIENT_ID_SPEC, CLIENT_SECRET, CLIENT_SECRET_SPEC, IS_AUTO_CREATION_SPEC,
    IS_AUTO_UPDATE_SPEC, IS_CREATION_ALLOWED_SPEC, IS_LINKING_ALLOWED_SPEC, NAME_SPEC, ORG_ID_SPEC,
    SCOPES_SPEC,
};

/// OAuth authorization endpoint.
pub const AUTHORIZATION_ENDPOINT: &str = "authorization_endpoint";
/// OAuth token endpoint.
pub const TOKEN_ENDPOINT: &str = "token_endpoint";
/// User info endpoint.
pub const USER_ENDPOINT: &str = "user_endpoint";

/// GitHub Enterprise Server provider type.
#[derive(Debug, Clone, Copy)]
pub struct GithubEs;

/// Endpoints of the GitHub Enterprise installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubEsSettings {
    /// OAuth authorization endpoint.
    #[serde(default)]
    pub authorization_endpoint: String,
    /// OAuth token endpoint.
    #[serde(default)]
    pub token_endpoint: String,
    /// User info endpoint.
    #[serde(default)]
    pub user_endpoint: String,
}

impl IdpFlavor for GithubEs {
    const KIND: ResourceKind = ResourceKind::OrgIdpGithubEs;
    const SCOPE: Scope = Scope::Organization;
    const FIELDS: &'static [FieldSpec] = &[
        ORG_ID_SPEC,
        NAME_SPEC,
        CLIENT_ID_SPEC,
        CLIENT_SECRET_SPEC,
        SCOPES_SPEC,
        FieldSpec::required(AUTHORIZATION_ENDPOINT, FieldType::String),
        FieldSpec::required(TOKEN_ENDPOINT, FieldType::String),
        FieldSpec::required(USER_ENDPOINT, FieldType::String),
        IS_LINKING_ALLOWED_SPEC,
        IS_CREATION_ALLOWED_SPEC,
        IS_AUTO_CREATION_SPEC,
        IS_AUTO_UPDATE_SPEC,
    ];
    const IMPORT: &'static ImportFormat = &ImportFormat::new(&[
        ImportSegment::required("id"),
        ImportSegment::optional(ORG_ID_FIELD),
        ImportSegment::trailing(CLIENT_SECRET),
    ]);
    const PATH: &'static str = "github_es";
    const CONFIG_KEY: &'static str = "githubEs";

    type Settings = GithubEsSettings;

    fn settings_from_state(state: &DeclaredState) -> Result<GithubEsSettings, InputError> {
        Ok(GithubEsSettings {
            authorization_endpoint: state.str_required(AUTHORIZATION_ENDPOINT)?.to_string(),
            token_endpoint: state.str_required(TOKEN_ENDPOINT)?.to_string(),
            user_endpoint: state.str_required(USER_ENDPOINT)?.to_string(),
        })
    }

    fn settings_into_state(settings: GithubEsSettings, state: &mut DeclaredState) {
        state.set(AUTHORIZATION_ENDPOINT, settings.authorization_endpoint);
        state.set(TOKEN_ENDPOINT, settings.token_endpoint);
        state.set(USER_ENDPOINT, settings.user_endpoint);
    }
}
