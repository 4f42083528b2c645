//! Organization-level Azure AD provider.

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::resource::{DeclaredState, FieldSpec, FieldType, ImportFormat, ImportSegment, ResourceKind, Scope};
use crate::zitadel::ORG_ID_FIELD;

use super::{
    IdpFlavor, CLIENT_ID_SPEC, CLIENT_SECRET, CLIENT_SECRET_SPEC, IS_AUTO_CREATION_SPEC,
    IS_AUTO_UPDATE_SPEC, IS_CREATION_ALLOWED_SPEC, IS_LINKING_ALLOWED_SPEC, NAME_SPEC, ORG_ID_SPEC,
    SCOPES_SPEC,
};

/// Tenant type, when no tenant ID is given.
pub const TENANT_TYPE: &str = "tenant_type";
/// Specific tenant ID; wins over the tenant type.
pub const TENANT_ID: &str = "tenant_id";
/// Trust the email addresses Azure AD reports.
pub const EMAIL_VERIFIED: &str = "email_verified";

/// Tenant types the service accepts.
pub const TENANT_TYPES: &[&str] = &[
    "AZURE_AD_TENANT_TYPE_COMMON",
    "AZURE_AD_TENANT_TYPE_ORGANISATIONS",
    "AZURE_AD_TENANT_TYPE_CONSUMERS",
];

/// Azure AD provider type.
#[derive(Debug, Clone, Copy)]
pub struct AzureAd;

/// Tenant selection; exactly one side is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureTenant {
    /// Well-known tenant type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_type: Option<String>,
    /// Specific tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Azure AD specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureSettings {
    /// Tenant selection, service default when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<AzureTenant>,
    /// Trust reported email addresses.
    #[serde(default)]
    pub email_verified: bool,
}

impl IdpFlavor for AzureAd {
    const KIND: ResourceKind = ResourceKind::OrgIdpAzureAd;
    const SCOPE: Scope = Scope::Organization;
    const FIELDS: &'static [FieldSpec] = &[
        ORG_ID_SPEC,
        NAME_SPEC,
        CLIENT_ID_SPEC,
        CLIENT_SECRET_SPEC,
        SCOPES_SPEC,
        FieldSpec::optional(TENANT_TYPE, FieldType::String),
        FieldSpec::optional(TENANT_ID, FieldType::String),
        FieldSpec::optional(EMAIL_VERIFIED, FieldType::Bool),
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
    const PATH: &'static str = "azure";
    const CONFIG_KEY: &'static str = "azureAd";

    type Settings = AzureSettings;

    fn settings_from_state(state: &DeclaredState) -> Result<AzureSettings, InputError> {
        let tenant_id = state.str_opt(TENANT_ID)?.filter(|id| !id.is_empty());
        let tenant_type = state.str_opt(TENANT_TYPE)?.filter(|t| !t.is_empty());

        if let Some(tenant_type) = tenant_type {
            if !TENANT_TYPES.contains(&tenant_type) {
                return Err(InputError::InvalidValue {
                    field: TENANT_TYPE.to_string(),
                    message: format!("'{tenant_type}' is not one of {}", TENANT_TYPES.join(", ")),
                });
            }
        }

        let tenant = match (tenant_id, tenant_type) {
            (Some(id), _) => Some(AzureTenant {
                tenant_type: None,
                tenant_id: Some(id.to_string()),
            }),
            (None, Some(tenant_type)) => Some(AzureTenant {
                tenant_type: Some(tenant_type.to_string()),
                tenant_id: None,
            }),
            (None, None) => None,
        };

        Ok(AzureSettings {
            tenant,
            email_verified: state.bool_or_default(EMAIL_VERIFIED)?,
        })
    }

    fn settings_into_state(settings: AzureSettings, state: &mut DeclaredState) {
        state.set(EMAIL_VERIFIED, settings.email_verified);

        let tenant = settings.tenant.unwrap_or_default();
        match (tenant.tenant_id, tenant.tenant_type) {
            (Some(id), _) => state.set(TENANT_ID, id),
            (None, tenant_type) => {
                state.set_opt(TENANT_TYPE, tenant_type);
                state.remove(TENANT_ID);
            }
        }
    }
}
