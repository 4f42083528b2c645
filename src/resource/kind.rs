//! The closed set of entity kinds and their field surfaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::kinds::idp::{AzureAd, GithubEs, GitlabSelfHosted, IdpAdapter, IdpFlavor};
use crate::kinds::{machine_key, member, MachineKeyAdapter, MemberAdapter, MemberScope};
use crate::zitadel::ProviderContext;

use super::adapter::Resource;
use super::import_id::ImportFormat;
use super::state::DeclaredState;
use super::value::FieldType;

/// Pattern every service-generated identifier matches.
pub const GENERATED_ID_PATTERN: &str = r"^[0-9]+$";

/// Whether a field is supplied by the caller, the service, or either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Caller must supply a value.
    Required,
    /// Caller may supply a value.
    Optional,
    /// Assigned by the service only.
    Computed,
    /// Caller may supply a value, otherwise the service assigns one.
    OptionalComputed,
}

/// Where an entity kind lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Instance-level entity, no organization context.
    Instance,
    /// Organization-level entity.
    Organization,
}

/// Contract for one field of an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Declared-state field name.
    pub name: &'static str,
    /// Accepted value type.
    pub field_type: FieldType,
    /// Who supplies the value.
    pub presence: Presence,
    /// Write-only secret, never overwritten from remote reads.
    pub sensitive: bool,
    /// Changing the value destroys and recreates the entity.
    pub force_new: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, field_type: FieldType, presence: Presence) -> Self {
        Self {
            name,
            field_type,
            presence,
            sensitive: false,
            force_new: false,
        }
    }

    /// A required field.
    #[must_use]
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self::new(name, field_type, Presence::Required)
    }

    /// An optional field.
    #[must_use]
    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self::new(name, field_type, Presence::Optional)
    }

    /// A service-assigned field.
    #[must_use]
    pub const fn computed(name: &'static str, field_type: FieldType) -> Self {
        Self::new(name, field_type, Presence::Computed)
    }

    /// An optional field the service fills in when omitted.
    #[must_use]
    pub const fn optional_computed(name: &'static str, field_type: FieldType) -> Self {
        Self::new(name, field_type, Presence::OptionalComputed)
    }

    /// Marks the field immutable-on-create.
    #[must_use]
    pub const fn forces_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Marks the field sensitive.
    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Returns true if only the service assigns this field.
    #[must_use]
    pub const fn is_computed_only(&self) -> bool {
        matches!(self.presence, Presence::Computed)
    }

    /// Returns true if the service may fill this field in.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(self.presence, Presence::Computed | Presence::OptionalComputed)
    }

    /// Returns true if the caller must supply this field.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.presence, Presence::Required)
    }
}

/// Every entity kind this crate can reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Key pair credential of a machine user.
    #[serde(rename = "zitadel_machine_key")]
    MachineKey,
    /// Instance administrator membership.
    #[serde(rename = "zitadel_instance_member")]
    InstanceMember,
    /// Organization membership.
    #[serde(rename = "zitadel_org_member")]
    OrgMember,
    /// Project membership.
    #[serde(rename = "zitadel_project_member")]
    ProjectMember,
    /// Organization-level Azure AD identity provider.
    #[serde(rename = "zitadel_org_idp_azure_ad")]
    OrgIdpAzureAd,
    /// Organization-level GitHub Enterprise Server identity provider.
    #[serde(rename = "zitadel_org_idp_github_es")]
    OrgIdpGithubEs,
    /// Instance-level self-hosted GitLab identity provider.
    #[serde(rename = "zitadel_idp_gitlab_self_hosted")]
    IdpGitlabSelfHosted,
}

impl ResourceKind {
    /// All kinds, in documentation order.
    pub const ALL: [Self; 7] = [
        Self::MachineKey,
        Self::InstanceMember,
        Self::OrgMember,
        Self::ProjectMember,
        Self::OrgIdpAzureAd,
        Self::OrgIdpGithubEs,
        Self::IdpGitlabSelfHosted,
    ];

    /// The declared-state type name.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::MachineKey => "zitadel_machine_key",
            Self::InstanceMember => "zitadel_instance_member",
            Self::OrgMember => "zitadel_org_member",
            Self::ProjectMember => "zitadel_project_member",
            Self::OrgIdpAzureAd => "zitadel_org_idp_azure_ad",
            Self::OrgIdpGithubEs => "zitadel_org_idp_github_es",
            Self::IdpGitlabSelfHosted => "zitadel_idp_gitlab_self_hosted",
        }
    }

    /// Instance or organization scope.
    #[must_use]
    pub const fn scope(self) -> Scope {
        match self {
            Self::InstanceMember => MemberScope::Instance.scope(),
            Self::OrgMember => MemberScope::Organization.scope(),
            Self::ProjectMember => MemberScope::Project.scope(),
            Self::MachineKey => Scope::Organization,
            Self::OrgIdpAzureAd => AzureAd::SCOPE,
            Self::OrgIdpGithubEs => GithubEs::SCOPE,
            Self::IdpGitlabSelfHosted => GitlabSelfHosted::SCOPE,
        }
    }

    /// The field surface.
    #[must_use]
    pub const fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::MachineKey => machine_key::FIELDS,
            Self::InstanceMember => MemberScope::Instance.fields(),
            Self::OrgMember => MemberScope::Organization.fields(),
            Self::ProjectMember => MemberScope::Project.fields(),
            Self::OrgIdpAzureAd => AzureAd::FIELDS,
            Self::OrgIdpGithubEs => GithubEs::FIELDS,
            Self::IdpGitlabSelfHosted => GitlabSelfHosted::FIELDS,
        }
    }

    /// The Import Key format.
    #[must_use]
    pub const fn import_format(self) -> &'static ImportFormat {
        match self {
            Self::MachineKey => machine_key::IMPORT,
            Self::InstanceMember => member::INSTANCE_IMPORT,
            Self::OrgMember => member::ORG_IMPORT,
            Self::ProjectMember => member::PROJECT_IMPORT,
            Self::OrgIdpAzureAd => AzureAd::IMPORT,
            Self::OrgIdpGithubEs => GithubEs::IMPORT,
            Self::IdpGitlabSelfHosted => GitlabSelfHosted::IMPORT,
        }
    }

    /// Looks up one field by name.
    #[must_use]
    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Fields whose planned value differs from the prior one.
    ///
    /// Computed-only fields are never compared. An optional+computed field
    /// left out of `planned` keeps whatever the service assigned. Unset
    /// optional fields compare equal to their type's zero value.
    #[must_use]
    pub fn changed_fields(self, prior: &DeclaredState, planned: &DeclaredState) -> Vec<&'static FieldSpec> {
        self.fields()
            .iter()
            .filter(|f| !f.is_computed_only())
            .filter(|f| f.presence != Presence::OptionalComputed || planned.is_set(f.name))
            .filter(|f| {
                let zero = f.field_type.zero();
                prior.get(f.name).unwrap_or(&zero) != planned.get(f.name).unwrap_or(&zero)
            })
            .collect()
    }

    /// Names of the sensitive fields.
    pub fn sensitive_fields(self) -> impl Iterator<Item = &'static str> {
        self.fields().iter().filter(|f| f.sensitive).map(|f| f.name)
    }

    /// Fields that never disqualify a no-op update: the scope field.
    #[must_use]
    pub const fn identity_fields(self) -> &'static [&'static str] {
        &["org_id"]
    }

    /// Builds the adapter for this kind on top of a provider context.
    #[must_use]
    pub fn adapter(self, ctx: &ProviderContext) -> Box<dyn Resource> {
        match self {
            Self::MachineKey => Box::new(MachineKeyAdapter::new(ctx.clone())),
            Self::InstanceMember => Box::new(MemberAdapter::new(MemberScope::Instance, ctx.clone())),
            Self::OrgMember => Box::new(MemberAdapter::new(MemberScope::Organization, ctx.clone())),
            Self::ProjectMember => Box::new(MemberAdapter::new(MemberScope::Project, ctx.clone())),
            Self::OrgIdpAzureAd => Box::new(IdpAdapter::<AzureAd>::new(ctx.clone())),
            Self::OrgIdpGithubEs => Box::new(IdpAdapter::<GithubEs>::new(ctx.clone())),
            Self::IdpGitlabSelfHosted => Box::new(IdpAdapter::<GitlabSelfHosted>::new(ctx.clone())),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl FromStr for ResourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == s)
            .ok_or_else(|| ConfigError::UnknownKind {
                kind: s.to_string(),
            })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => write!(f, "instance"),
            Self::Organization => write!(f, "organization"),
        }
    }
}
