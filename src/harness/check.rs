//! Independent read-side checks.
//!
//! A check reads one attribute of the entity under test straight from the
//! service, so a scenario can confirm a step took effect without trusting
//! the state the driver returned.

use async_trait::async_trait;

use crate::error::Result;
use crate::kinds::member::{MemberScope, ROLES, USER_ID};
use crate::resource::{AttrValue, DeclaredState, ReadOutcome, ResourceKind, Scope};
use crate::zitadel::types::{ListMembersRequest, ListMembersResponse};
use crate::zitadel::ProviderContext;

use super::poll::CheckFailure;

/// What a check should observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The entity exists and the field has this value.
    Value(AttrValue),
    /// The service reports the entity does not exist.
    Absent,
}

/// Reads the attribute under test from the service.
#[async_trait]
pub trait RemoteCheck: Send + Sync {
    /// Name of the field observed.
    fn field(&self) -> &str;

    /// Current remote value of the field, or `None` if the entity is gone.
    async fn observe(&self, ctx: &ProviderContext, state: &DeclaredState) -> Result<Option<AttrValue>>;
}

/// Runs `check` once and compares the result with `expected`.
///
/// # Errors
///
/// Returns [`CheckFailure::Mismatch`] if the observation differs, or
/// [`CheckFailure::Error`] if the read itself failed.
pub async fn verify(
    check: &dyn RemoteCheck,
    ctx: &ProviderContext,
    state: &DeclaredState,
    expected: &Expectation,
) -> std::result::Result<(), CheckFailure> {
    let observed = check.observe(ctx, state).await?;

    let passed = match (expected, &observed) {
        (Expectation::Absent, None) => true,
        (Expectation::Value(want), Some(got)) => want == got,
        _ => false,
    };
    if passed {
        return Ok(());
    }

    Err(CheckFailure::Mismatch {
        field: check.field().to_string(),
        expected: match expected {
            Expectation::Value(v) => v.to_string(),
            Expectation::Absent => String::from("absent"),
        },
        actual: observed.map_or_else(|| String::from("absent"), |v| v.to_string()),
    })
}

/// Checks a field through the kind's own read mapping.
///
/// An unset field reads as its type's zero value.
#[derive(Debug, Clone, Copy)]
pub struct AttributeCheck {
    kind: ResourceKind,
    field: &'static str,
}

impl AttributeCheck {
    /// Checks `field` of `kind`.
    #[must_use]
    pub const fn new(kind: ResourceKind, field: &'static str) -> Self {
        Self { kind, field }
    }
}

#[async_trait]
impl RemoteCheck for AttributeCheck {
    fn field(&self) -> &str {
        self.field
    }

    async fn observe(&self, ctx: &ProviderContext, state: &DeclaredState) -> Result<Option<AttrValue>> {
        match self.kind.adapter(ctx).read(state).await? {
            ReadOutcome::NotFound => Ok(None),
            ReadOutcome::Found(remote) => {
                let zero = self.kind.field(self.field).map(|f| f.field_type.zero());
                Ok(remote.get(self.field).cloned().or(zero))
            }
        }
    }
}

/// Checks a membership's roles with a raw member search.
#[derive(Debug, Clone, Copy)]
pub struct MemberRolesCheck {
    scope: MemberScope,
}

impl MemberRolesCheck {
    /// Checks memberships of one scope.
    #[must_use]
    pub const fn new(scope: MemberScope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl RemoteCheck for MemberRolesCheck {
    fn field(&self) -> &str {
        ROLES
    }

    async fn observe(&self, ctx: &ProviderContext, state: &DeclaredState) -> Result<Option<AttrValue>> {
        let user_id = state.str_required(USER_ID)?;
        let search = format!("{}/_search", self.scope.base_path(state)?);
        let client = match self.scope.scope() {
            Scope::Instance => ctx.instance_scope(),
            Scope::Organization => ctx.org_scope(state),
        };

        let response: ListMembersResponse = match client.post(&search, &ListMembersRequest::for_user(user_id)).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(response
            .result
            .into_iter()
            .find(|m| m.user_id == user_id)
            .map(|m| AttrValue::set(m.roles)))
    }
}
