//! Driver behaviour against the in-memory service.

mod common;

use common::{FakeZitadel, ORG_ID};
use zitadel_reconcile::driver::{ApplyAction, EntityDriver};
use zitadel_reconcile::kinds::machine_key::{EXPIRATION_DATE, KEY_DETAILS, KEY_TYPE};
use zitadel_reconcile::kinds::member::{PROJECT_ID, ROLES, USER_ID};
use zitadel_reconcile::resource::{AttrValue, DeclaredState, ResourceKind};
use zitadel_reconcile::zitadel::HttpMethod;

const ORG_MEMBERS: &str = "/management/v1/orgs/me/members";

fn org_member(user_id: &str, roles: &[&str]) -> DeclaredState {
    DeclaredState::new()
        .with(USER_ID, user_id)
        .with(ROLES, AttrValue::set(roles.iter().copied()))
}

fn machine_key(user_id: &str) -> DeclaredState {
    DeclaredState::new()
        .with(USER_ID, user_id)
        .with(KEY_TYPE, "KEY_TYPE_JSON")
        .with(EXPIRATION_DATE, "2519-04-01T08:45:00Z")
}

#[tokio::test]
async fn test_apply_of_unchanged_declaration_makes_no_call() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::OrgMember, &ctx);

    let declared = org_member("42", &["ORG_OWNER_VIEWER"]);
    let created = driver.create(&declared).await.expect("create");
    fake.reset_calls();

    let applied = driver.apply(&created, &declared).await.expect("apply");

    assert_eq!(fake.call_count(), 0);
    assert_eq!(applied.id(), created.id());
}

#[tokio::test]
async fn test_role_change_updates_in_place() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::OrgMember, &ctx);

    let created = driver
        .create(&org_member("42", &["ORG_OWNER_VIEWER"]))
        .await
        .expect("create");
    fake.reset_calls();

    let desired = org_member("42", &["ORG_OWNER_VIEWER", "ORG_USER_MANAGER"]);
    assert!(matches!(driver.decide(&created, &desired), ApplyAction::Update { .. }));
    let updated = driver.apply(&created, &desired).await.expect("apply");

    let mutations = fake.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, HttpMethod::Put);
    assert_eq!(updated.id(), "42");
    assert_eq!(
        fake.member_roles(ORG_MEMBERS, "42"),
        Some(vec![String::from("ORG_OWNER_VIEWER"), String::from("ORG_USER_MANAGER")])
    );
}

#[tokio::test]
async fn test_immutable_change_deletes_then_creates() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::MachineKey, &ctx);

    let created = driver.create(&machine_key("200")).await.expect("create");
    fake.reset_calls();

    let desired = machine_key("201");
    assert_eq!(
        driver.decide(&created, &desired),
        ApplyAction::Replace {
            fields: vec![USER_ID]
        }
    );
    let replaced = driver.apply(&created, &desired).await.expect("replace");

    let methods: Vec<HttpMethod> = fake.mutations().iter().map(|c| c.method).collect();
    assert_eq!(methods, vec![HttpMethod::Delete, HttpMethod::Post]);
    assert_ne!(replaced.id(), created.id());
    assert!(!fake.key_exists(created.id()));
    assert!(fake.key_exists(replaced.id()));
}

#[tokio::test]
async fn test_key_material_is_kept_across_refresh() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::MachineKey, &ctx);

    let created = driver.create(&machine_key("200")).await.expect("create");
    assert!(created.is_set(KEY_DETAILS));

    let refreshed = driver.refresh(&created).await.expect("refresh");
    assert_eq!(refreshed.get(KEY_DETAILS), created.get(KEY_DETAILS));
    assert_eq!(refreshed, created);
}

#[tokio::test]
async fn test_entity_deleted_remotely_refreshes_to_absent() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::OrgMember, &ctx);

    let created = driver
        .create(&org_member("42", &["ORG_OWNER"]))
        .await
        .expect("create");
    fake.remove_member(ORG_MEMBERS, "42");

    let refreshed = driver.refresh(&created).await.expect("NotFound is not an error");
    assert!(!refreshed.has_id());
    assert_eq!(refreshed.get(ROLES), created.get(ROLES));
}

#[tokio::test]
async fn test_destroy_of_missing_entity_succeeds() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::OrgMember, &ctx);

    let recorded = org_member("42", &["ORG_OWNER"]).with_id("42");
    let cleared = driver.destroy(&recorded).await.expect("already gone");

    assert!(!cleared.has_id());
    assert_eq!(fake.mutations().len(), 1);
}

#[tokio::test]
async fn test_malformed_timestamp_rejected_without_remote_call() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::MachineKey, &ctx);

    let err = driver
        .create(&machine_key("200").with(EXPIRATION_DATE, "next tuesday"))
        .await
        .expect_err("timestamp is not RFC 3339");

    assert!(err.is_input_error());
    assert!(err.to_string().contains("zitadel_machine_key"));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_import_reads_project_member_by_key() {
    let fake = FakeZitadel::new();
    fake.set_member_roles("/management/v1/projects/7/members", "42", &["PROJECT_OWNER_VIEWER"]);
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::ProjectMember, &ctx);

    let imported = driver.import(&format!("7:42:{ORG_ID}")).await.expect("import");

    assert_eq!(imported.id(), "42");
    assert_eq!(imported.get(PROJECT_ID), Some(&AttrValue::from("7")));
    assert_eq!(imported.get(ROLES), Some(&AttrValue::set(["PROJECT_OWNER_VIEWER"])));
    assert_eq!(fake.calls()[0].org_id.as_deref(), Some(ORG_ID));
}

#[tokio::test]
async fn test_malformed_import_key_rejected_without_remote_call() {
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let driver = EntityDriver::for_kind(ResourceKind::ProjectMember, &ctx);

    let err = driver.import("7").await.expect_err("user segment missing");

    assert!(err.is_input_error());
    assert_eq!(fake.call_count(), 0);
}
