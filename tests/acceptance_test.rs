//! Lifecycle scenarios against a live instance.
//!
//! Run with `ZITADEL_ACCEPTANCE=1`, `ZITADEL_DOMAIN`, `ZITADEL_ACCESS_TOKEN`
//! and optionally `ZITADEL_PORT`, `ZITADEL_INSECURE` and `ZITADEL_ORG_ID`:
//!
//! ```text
//! cargo test --test acceptance_test -- --ignored
//! ```

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use zitadel_reconcile::config::{ConfigParser, DeployConfig, ProviderSettings};
use zitadel_reconcile::harness::{ApiDependency, LifecycleScenario, MemberRolesCheck, PollPolicy};
use zitadel_reconcile::kinds::member::{MemberScope, ROLES, USER_ID};
use zitadel_reconcile::resource::{AttrValue, DeclaredState, ResourceKind};
use zitadel_reconcile::zitadel::{ProviderContext, ZitadelClient};

const ACCEPTANCE_ENV: &str = "ZITADEL_ACCEPTANCE";

/// Provider context for the live instance, or `None` when not enabled.
fn live_context() -> Option<ProviderContext> {
    if std::env::var(ACCEPTANCE_ENV).is_err() {
        eprintln!("{ACCEPTANCE_ENV} is not set, skipping");
        return None;
    }

    let mut config = DeployConfig {
        provider: ProviderSettings::for_domain(""),
        state: Default::default(),
        resources: vec![],
    };
    ConfigParser::apply_env_overrides(&mut config, |name| std::env::var(name).ok()).expect("environment overrides");
    let token = ConfigParser::access_token().expect("access token");
    let client = ZitadelClient::from_settings(&config.provider, &token).expect("client");

    Some(ProviderContext::new(Arc::new(client)).with_default_org(config.provider.org_id))
}

fn human_user() -> ApiDependency {
    let user_name = format!("lifecycle-{}", Uuid::new_v4().simple());
    ApiDependency::new(
        "user",
        "/management/v1/users/human/_import",
        json!({
            "userName": user_name,
            "profile": {"firstName": "Lifecycle", "lastName": "Check"},
            "email": {"email": format!("{user_name}@example.com"), "isEmailVerified": true},
        }),
        "/userId",
        "/management/v1/users/{id}",
    )
}

#[tokio::test]
#[ignore = "needs a live instance"]
async fn test_live_instance_member_lifecycle() {
    let Some(ctx) = live_context() else {
        return;
    };

    let report = LifecycleScenario::new(
        ResourceKind::InstanceMember,
        ROLES,
        AttrValue::empty_set(),
        AttrValue::set(["IAM_OWNER_VIEWER"]),
        MemberRolesCheck::new(MemberScope::Instance),
        |ids| DeclaredState::new().with(USER_ID, ids["user"].as_str()),
    )
    .dependency(human_user())
    .with_import(&[])
    .poll(PollPolicy::new(10, Duration::from_secs(2)))
    .run(&ctx)
    .await
    .expect("lifecycle passes");

    assert_eq!(report.steps.len(), 4);
}

#[tokio::test]
#[ignore = "needs a live instance"]
async fn test_live_org_member_lifecycle() {
    let Some(ctx) = live_context() else {
        return;
    };

    LifecycleScenario::new(
        ResourceKind::OrgMember,
        ROLES,
        AttrValue::set(["ORG_OWNER_VIEWER"]),
        AttrValue::set(["ORG_OWNER_VIEWER", "ORG_USER_MANAGER"]),
        MemberRolesCheck::new(MemberScope::Organization),
        |ids| DeclaredState::new().with(USER_ID, ids["user"].as_str()),
    )
    .dependency(human_user())
    .with_import(&[])
    .poll(PollPolicy::new(10, Duration::from_secs(2)))
    .run(&ctx)
    .await
    .expect("lifecycle passes");
}
