//! Instance-level self-hosted GitLab provider.

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::resource::{DeclaredState, FieldSpec, FieldType, ImportFormat, ImportSegment, ResourceKind, Scope};

use super::{
    IdpFlavor, CLIENT_ID_SPEC, CLIENT_SECRET, CLIENT_SECRET_SPEC, IS_AUTO_CREATION_SPEC,
    IS_AUTO_UPDATE_SPEC, IS_CREATION_ALLOWED_SPEC, IS_LINKING_ALLOWED_SPEC, NAME_SPEC, SCOPES_SPEC,
};

/// Base URL of the GitLab installation.
pub const ISSUER: &str = "issuer";

/// Self-hosted GitLab provider type.
#[derive(Debug, Clone, Copy)]
pub struct GitlabSelfHosted;

/// GitLab specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitlabSettings {
    /// Base URL of the installation.
    #[serde(default)]
    pub issuer: String,
}

impl IdpFlavor for GitlabSelfHosted {
    const KIND: ResourceKind = ResourceKind::IdpGitlabSelfHosted;
    const SCOPE: Scope = Scope::Instance;
    const FIELDS: &'static [FieldSpec] = &[
        NAME_SPEC,
        FieldSpec::required(ISSUER, FieldType::String),
        CLIENT_ID_SPEC,
        CLIENT_SECRET_SPEC,
        SCOPES_SPEC,
        IS_LINKING_ALLOWED_SPEC,
        IS_CREATION_ALLOWED_SPEC,
        IS_AUTO_CREATION_SPEC,
        IS_AUTO_UPDATE_SPEC,
    ];
    const IMPORT: &'static ImportFormat = &ImportFormat::new(&[
        ImportSegment::required("id"),
        ImportSegment::trailing(CLIENT_SECRET),
    ]);
    const PATH: &'static str = "gitlab_self_hosted";
    const CONFIG_KEY: &'static str = "gitlabSelfHosted";

    type Settings = GitlabSettings;

    fn settings_from_state(state: &DeclaredState) -> Result<GitlabSettings, InputError> {
        Ok(GitlabSettings {
            issuer: state.str_required(ISSUER)?.to_string(),
        })
    }

    fn settings_into_state(settings: GitlabSettings, state: &mut DeclaredState) {
        state.set(ISSUER, settings.issuer);
    }
}
