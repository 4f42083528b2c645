//! Memberships: a user holding roles on the instance, an organization or a
//! project.
//!
//! A membership has no identifier of its own; the member's user ID serves
//! as one. Roles are the only field that can change in place.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{InputError, Result};
use crate::resource::{
    absent_ok, has_changes, AttrValue, DeclaredState, FieldSpec, FieldType, ImportFormat,
    ImportSegment, ReadOutcome, Resource, ResourceKind, Scope,
};
use crate::zitadel::types::{
    AddMemberRequest, DetailsResponse, ListMembersRequest, ListMembersResponse, UpdateMemberRequest,
};
use crate::zitadel::{ProviderContext, ScopedClient, ORG_ID_FIELD};

/// Member's user ID.
pub const USER_ID: &str = "user_id";
/// Project the membership applies to.
pub const PROJECT_ID: &str = "project_id";
/// Granted roles.
pub const ROLES: &str = "roles";

const INSTANCE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(USER_ID, FieldType::String).forces_new(),
    FieldSpec::required(ROLES, FieldType::StringSet),
];

const ORG_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional(ORG_ID_FIELD, FieldType::String).forces_new(),
    FieldSpec::required(USER_ID, FieldType::String).forces_new(),
    FieldSpec::required(ROLES, FieldType::StringSet),
];

const PROJECT_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional(ORG_ID_FIELD, FieldType::String).forces_new(),
    FieldSpec::required(PROJECT_ID, FieldType::String).forces_new(),
    FieldSpec::required(USER_ID, FieldType::String).forces_new(),
    FieldSpec::required(ROLES, FieldType::StringSet),
];

/// `<user_id>`
pub const INSTANCE_IMPORT: &ImportFormat = &ImportFormat::new(&[ImportSegment::required(USER_ID)]);

/// `<user_id[:org_id]>`
pub const ORG_IMPORT: &ImportFormat = &ImportFormat::new(&[
    ImportSegment::required(USER_ID),
    ImportSegment::optional(ORG_ID_FIELD),
]);

/// `<project_id:user_id[:org_id]>`
pub const PROJECT_IMPORT: &ImportFormat = &ImportFormat::new(&[
    ImportSegment::required(PROJECT_ID),
    ImportSegment::required(USER_ID),
    ImportSegment::optional(ORG_ID_FIELD),
]);

/// What a membership grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberScope {
    /// The whole instance.
    Instance,
    /// One organization.
    Organization,
    /// One project.
    Project,
}

impl MemberScope {
    /// Instance or organization scope of the entity.
    #[must_use]
    pub const fn scope(self) -> Scope {
        match self {
            Self::Instance => Scope::Instance,
            Self::Organization | Self::Project => Scope::Organization,
        }
    }

    /// Field surface.
    #[must_use]
    pub const fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Instance => INSTANCE_FIELDS,
            Self::Organization => ORG_FIELDS,
            Self::Project => PROJECT_FIELDS,
        }
    }

    const fn kind(self) -> ResourceKind {
        match self {
            Self::Instance => ResourceKind::InstanceMember,
            Self::Organization => ResourceKind::OrgMember,
            Self::Project => ResourceKind::ProjectMember,
        }
    }

    pub(crate) fn base_path(self, declared: &DeclaredState) -> std::result::Result<String, InputError> {
        Ok(match self {
            Self::Instance => String::from("/admin/v1/members"),
            Self::Organization => String::from("/management/v1/orgs/me/members"),
            Self::Project => format!(
                "/management/v1/projects/{}/members",
                declared.str_required(PROJECT_ID)?
            ),
        })
    }
}

/// Validated membership input.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberSpec {
    base_path: String,
    user_id: String,
}

impl MemberSpec {
    fn from_state(scope: MemberScope, state: &DeclaredState) -> std::result::Result<Self, InputError> {
        let user_id = match state.str_opt(USER_ID)? {
            Some(id) if !id.is_empty() => id.to_string(),
            _ if state.has_id() => state.id().to_string(),
            _ => {
                return Err(InputError::MissingField {
                    field: USER_ID.to_string(),
                });
            }
        };

        Ok(Self {
            base_path: scope.base_path(state)?,
            user_id,
        })
    }

    fn member_path(&self) -> String {
        format!("{}/{}", self.base_path, self.user_id)
    }
}

fn roles_of(state: &DeclaredState) -> std::result::Result<Vec<String>, InputError> {
    if !state.is_set(ROLES) {
        return Err(InputError::MissingField {
            field: ROLES.to_string(),
        });
    }
    Ok(state.set_or_empty(ROLES)?.into_iter().collect())
}

/// Checks declared state the way create would, without any remote call.
///
/// # Errors
///
/// Returns the first input error create would report.
pub fn validate(scope: MemberScope, state: &DeclaredState) -> std::result::Result<(), InputError> {
    MemberSpec::from_state(scope, state)?;
    roles_of(state).map(|_| ())
}

/// Adapter for the three membership kinds.
#[derive(Debug, Clone)]
pub struct MemberAdapter {
    scope: MemberScope,
    ctx: ProviderContext,
}

impl MemberAdapter {
    /// Creates the adapter for one membership scope.
    #[must_use]
    pub const fn new(scope: MemberScope, ctx: ProviderContext) -> Self {
        Self { scope, ctx }
    }

    fn client(&self, declared: &DeclaredState) -> ScopedClient {
        match self.scope.scope() {
            Scope::Instance => self.ctx.instance_scope(),
            Scope::Organization => self.ctx.org_scope(declared),
        }
    }
}

#[async_trait]
impl Resource for MemberAdapter {
    fn kind(&self) -> ResourceKind {
        self.scope.kind()
    }

    async fn create(&self, declared: &DeclaredState) -> Result<DeclaredState> {
        let spec = MemberSpec::from_state(self.scope, declared)?;
        let request = AddMemberRequest {
            user_id: spec.user_id.clone(),
            roles: roles_of(declared)?,
        };

        let _: DetailsResponse = self.client(declared).post(&spec.base_path, &request).await?;
        info!("Added {} {} with {} role(s)", self.kind(), spec.user_id, request.roles.len());

        Ok(declared.clone().with_id(spec.user_id))
    }

    async fn read(&self, declared: &DeclaredState) -> Result<ReadOutcome> {
        let spec = MemberSpec::from_state(self.scope, declared)?;
        let search = format!("{}/_search", spec.base_path);

        let response: ListMembersResponse = match self
            .client(declared)
            .post(&search, &ListMembersRequest::for_user(&spec.user_id))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(ReadOutcome::NotFound),
            Err(e) => return Err(e.into()),
        };

        let Some(member) = response
            .result
            .into_iter()
            .find(|m| m.user_id == spec.user_id)
        else {
            debug!("{} {} is no longer a member", self.kind(), spec.user_id);
            return Ok(ReadOutcome::NotFound);
        };

        let mut state = declared.clone().with_id(member.user_id.clone());
        state.set(USER_ID, member.user_id);
        state.set(ROLES, AttrValue::set(member.roles));
        Ok(ReadOutcome::Found(state))
    }

    async fn update(&self, prior: &DeclaredState, planned: &DeclaredState) -> Result<DeclaredState> {
        if !has_changes(self.kind(), prior, planned) {
            return Ok(planned.clone());
        }

        let spec = MemberSpec::from_state(self.scope, planned)?;
        let request = UpdateMemberRequest {
            roles: roles_of(planned)?,
        };

        let _: DetailsResponse = self.client(planned).put(&spec.member_path(), &request).await?;
        info!("Updated roles of {} {}", self.kind(), spec.user_id);

        Ok(planned.clone().with_id(spec.user_id))
    }

    async fn delete(&self, declared: &DeclaredState) -> Result<()> {
        let spec = MemberSpec::from_state(self.scope, declared)?;

        absent_ok(self.client(declared).delete(&spec.member_path()).await)?;
        info!("Removed {} {}", self.kind(), spec.user_id);
        Ok(())
    }
}
