//! Lifecycle scenarios against the in-memory service.

mod common;

use common::FakeZitadel;
use zitadel_reconcile::error::HarnessError;
use zitadel_reconcile::harness::{
    steps, AttributeCheck, EntityDependency, ExistingDependency, LifecycleScenario, MemberRolesCheck, PollPolicy,
};
use zitadel_reconcile::kinds::member::{MemberScope, ROLES, USER_ID};
use zitadel_reconcile::resource::{AttrValue, DeclaredState, ResourceKind};
use zitadel_reconcile::zitadel::HttpMethod;

const USER: &str = "170000000000000042";
const INSTANCE_MEMBERS: &str = "/admin/v1/members";
const ORG_MEMBERS: &str = "/management/v1/orgs/me/members";

fn org_membership_dependency() -> EntityDependency {
    EntityDependency::new("user", ResourceKind::OrgMember, |_| {
        DeclaredState::new()
            .with(USER_ID, USER)
            .with(ROLES, AttrValue::set(["ORG_OWNER"]))
    })
}

fn instance_member_scenario() -> LifecycleScenario {
    LifecycleScenario::new(
        ResourceKind::InstanceMember,
        ROLES,
        AttrValue::empty_set(),
        AttrValue::set(["IAM_OWNER_VIEWER"]),
        MemberRolesCheck::new(MemberScope::Instance),
        |ids| DeclaredState::new().with(USER_ID, ids["user"].as_str()),
    )
    .poll(PollPolicy::once())
}

#[tokio::test]
async fn test_instance_member_roles_lifecycle() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();

    let report = instance_member_scenario()
        .dependency(ExistingDependency::new("user", USER))
        .with_import(&[])
        .run(&ctx)
        .await
        .expect("scenario passes");

    let names: Vec<&str> = report.steps.iter().map(|s| s.step).collect();
    assert_eq!(names, vec![steps::CREATE, steps::UPDATE, steps::IMPORT, steps::DELETE]);
    assert_eq!(report.id, USER);
    assert_eq!(report.dependencies["user"], USER);
    assert!(report.steps.iter().all(|s| s.id == USER));
    let attempts: Vec<Option<u32>> = report.steps.iter().map(|s| s.attempts).collect();
    assert_eq!(attempts, vec![Some(1), Some(1), None, Some(1)]);
    assert_eq!(fake.member_roles(INSTANCE_MEMBERS, USER), None);
}

#[tokio::test]
async fn test_dependencies_are_torn_down_after_success() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();

    instance_member_scenario()
        .dependency(org_membership_dependency())
        .run(&ctx)
        .await
        .expect("scenario passes");

    assert_eq!(fake.member_roles(ORG_MEMBERS, USER), None);
}

#[tokio::test]
async fn test_dependencies_are_torn_down_after_failed_create() {
    let fake = FakeZitadel::new();
    fake.set_member_roles(INSTANCE_MEMBERS, USER, &["IAM_OWNER"]);
    let ctx = fake.context();

    let err = instance_member_scenario()
        .dependency(org_membership_dependency())
        .run(&ctx)
        .await
        .expect_err("member already exists");

    assert!(err.to_string().starts_with("step 'create' failed"));
    assert_eq!(fake.member_roles(ORG_MEMBERS, USER), None);
    assert_eq!(
        fake.member_roles(INSTANCE_MEMBERS, USER),
        Some(vec![String::from("IAM_OWNER")])
    );
}

#[tokio::test]
async fn test_failed_update_removes_entity_and_dependencies() {
    let fake = FakeZitadel::new();
    fake.deny(HttpMethod::Put);
    let ctx = fake.context();

    let err = instance_member_scenario()
        .dependency(org_membership_dependency())
        .run(&ctx)
        .await
        .expect_err("update is denied");

    assert!(err.to_string().starts_with("step 'update' failed"));
    assert_eq!(fake.member_roles(INSTANCE_MEMBERS, USER), None);
    assert_eq!(fake.member_roles(ORG_MEMBERS, USER), None);
}

#[tokio::test]
async fn test_immutable_attribute_reports_recreation() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();

    let err = LifecycleScenario::new(
        ResourceKind::OrgMember,
        USER_ID,
        "42",
        "43",
        AttributeCheck::new(ResourceKind::OrgMember, USER_ID),
        |_| DeclaredState::new().with(ROLES, AttrValue::set(["ORG_OWNER_VIEWER"])),
    )
    .poll(PollPolicy::once())
    .run(&ctx)
    .await
    .expect_err("user_id cannot change in place");

    assert!(matches!(
        err,
        HarnessError::Recreated { ref before, ref after, .. } if before == "42" && after == "43"
    ));
    assert_eq!(fake.member_roles(ORG_MEMBERS, "42"), None);
    assert_eq!(fake.member_roles(ORG_MEMBERS, "43"), None);
}

#[tokio::test]
async fn test_existing_member_fails_create_step() {
    let fake = FakeZitadel::new();
    fake.set_member_roles(INSTANCE_MEMBERS, USER, &["IAM_OWNER"]);
    let ctx = fake.context();

    let err = instance_member_scenario()
        .dependency(ExistingDependency::new("user", USER))
        .run(&ctx)
        .await
        .expect_err("member already exists");

    assert!(err.to_string().starts_with("step 'create' failed"));
}
