//! Entities a scenario needs before the entity under test can exist.
//!
//! Dependencies are provisioned in order and torn down in reverse, whether
//! or not the scenario passed.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::driver::EntityDriver;
use crate::error::{ApiError, Result};
use crate::resource::{absent_ok, DeclaredState, ResourceKind};
use crate::zitadel::{ProviderContext, ScopedClient, ORG_ID_FIELD};

/// Identifiers of provisioned dependencies, by dependency name.
pub type DependencyIds = BTreeMap<String, String>;

/// Builds declared state from the identifiers provisioned so far.
pub type DeclareFn = Box<dyn Fn(&DependencyIds) -> DeclaredState + Send + Sync>;

/// Something a scenario provisions before it runs.
#[async_trait]
pub trait Dependency: Send + Sync {
    /// Name the scenario refers to it by.
    fn name(&self) -> &str;

    /// Provisions the dependency and returns its identifier.
    async fn provision(&mut self, ctx: &ProviderContext, ids: &DependencyIds) -> Result<String>;

    /// Removes what `provision` created. An already-absent dependency is fine.
    async fn teardown(&self, ctx: &ProviderContext) -> Result<()>;
}

/// An entity of a supported kind, created through its driver.
pub struct EntityDependency {
    name: String,
    kind: ResourceKind,
    declare: DeclareFn,
    created: Option<DeclaredState>,
}

impl EntityDependency {
    /// Creates a dependency on an entity of `kind`.
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        declare: impl Fn(&DependencyIds) -> DeclaredState + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            declare: Box::new(declare),
            created: None,
        }
    }
}

#[async_trait]
impl Dependency for EntityDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provision(&mut self, ctx: &ProviderContext, ids: &DependencyIds) -> Result<String> {
        let declared = (self.declare)(ids);
        let created = EntityDriver::for_kind(self.kind, ctx).create(&declared).await?;
        let id = created.id().to_string();
        self.created = Some(created);
        Ok(id)
    }

    async fn teardown(&self, ctx: &ProviderContext) -> Result<()> {
        if let Some(created) = &self.created {
            EntityDriver::for_kind(self.kind, ctx).destroy(created).await?;
        }
        Ok(())
    }
}

/// An entity outside the supported kinds, created with a raw API call.
///
/// Used for users and projects the entities under test refer to.
#[derive(Debug, Clone)]
pub struct ApiDependency {
    name: String,
    org_id: Option<String>,
    create_path: String,
    body: Value,
    id_pointer: String,
    delete_path: String,
    created_id: Option<String>,
}

impl ApiDependency {
    /// Posts `body` to `create_path` and reads the identifier at the JSON
    /// pointer `id_pointer`. `delete_path` may contain `{id}`.
    pub fn new(
        name: impl Into<String>,
        create_path: impl Into<String>,
        body: Value,
        id_pointer: impl Into<String>,
        delete_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            org_id: None,
            create_path: create_path.into(),
            body,
            id_pointer: id_pointer.into(),
            delete_path: delete_path.into(),
            created_id: None,
        }
    }

    /// Creates the dependency in an explicit organization.
    #[must_use]
    pub fn in_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    fn client(&self, ctx: &ProviderContext) -> ScopedClient {
        let scope = self
            .org_id
            .as_ref()
            .map_or_else(DeclaredState::new, |org| DeclaredState::new().with(ORG_ID_FIELD, org.as_str()));
        ctx.org_scope(&scope)
    }
}

#[async_trait]
impl Dependency for ApiDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provision(&mut self, ctx: &ProviderContext, _ids: &DependencyIds) -> Result<String> {
        let response: Value = self.client(ctx).post(&self.create_path, &self.body).await?;
        let id = response
            .pointer(&self.id_pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ApiError::invalid_response(format!("no identifier at {} in response", self.id_pointer))
            })?
            .to_string();

        self.created_id = Some(id.clone());
        Ok(id)
    }

    async fn teardown(&self, ctx: &ProviderContext) -> Result<()> {
        if let Some(id) = &self.created_id {
            let path = self.delete_path.replace("{id}", id);
            absent_ok(self.client(ctx).delete(&path).await)?;
        }
        Ok(())
    }
}

/// An entity that already exists and is left alone.
#[derive(Debug, Clone)]
pub struct ExistingDependency {
    name: String,
    id: String,
}

impl ExistingDependency {
    /// Refers to an existing entity by identifier.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

#[async_trait]
impl Dependency for ExistingDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provision(&mut self, _ctx: &ProviderContext, _ids: &DependencyIds) -> Result<String> {
        Ok(self.id.clone())
    }

    async fn teardown(&self, _ctx: &ProviderContext) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for EntityDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDependency")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("created", &self.created.as_ref().map(DeclaredState::id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zitadel::{HttpMethod, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_api_dependency_round_trip() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|call| call.method == HttpMethod::Post && call.path == "/management/v1/users/human/_import")
            .times(1)
            .returning(|_| Ok(json!({"userId": "1001"})));
        mock.expect_send()
            .withf(|call| call.method == HttpMethod::Delete && call.path == "/management/v1/users/1001")
            .times(1)
            .returning(|_| Err(ApiError::NotFound { message: String::from("user") }));
        let ctx = ProviderContext::new(Arc::new(mock));

        let mut user = ApiDependency::new(
            "user",
            "/management/v1/users/human/_import",
            json!({"userName": "lifecycle"}),
            "/userId",
            "/management/v1/users/{id}",
        );
        let id = user.provision(&ctx, &DependencyIds::new()).await.expect("provision");
        assert_eq!(id, "1001");
        user.teardown(&ctx).await.expect("already gone is fine");
    }

    #[tokio::test]
    async fn test_missing_identifier_is_invalid_response() {
        let mut mock = MockTransport::new();
        mock.expect_send().returning(|_| Ok(json!({"details": {}})));
        let ctx = ProviderContext::new(Arc::new(mock));

        let mut project = ApiDependency::new("project", "/management/v1/projects", json!({}), "/id", "/management/v1/projects/{id}");
        let err = project
            .provision(&ctx, &DependencyIds::new())
            .await
            .expect_err("no id");
        assert!(err.to_string().contains("/id"));

        let mut mock = MockTransport::new();
        mock.expect_send().never();
        project
            .teardown(&ProviderContext::new(Arc::new(mock)))
            .await
            .expect("nothing to remove");
    }
}
