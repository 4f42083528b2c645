//! End-to-end reconciliation against the in-memory service.

mod common;

use common::FakeZitadel;
use tempfile::TempDir;
use zitadel_reconcile::cli::{OutputFormat, OutputFormatter};
use zitadel_reconcile::config::{ConfigParser, DeployConfig};
use zitadel_reconcile::reconciler::Reconciler;
use zitadel_reconcile::resource::ResourceKind;
use zitadel_reconcile::state::{LocalStateStore, StateStore};

const ORG_MEMBERS: &str = "/management/v1/orgs/me/members";

fn declarations(member_roles: &str) -> DeployConfig {
    let yaml = format!(
        r#"
provider:
  domain: zitadel.test
resources:
  - name: ops-viewer
    kind: zitadel_org_member
    attributes:
      user_id: "42"
      roles: {member_roles}
  - name: ci-key
    kind: zitadel_machine_key
    attributes:
      user_id: "200"
      key_type: KEY_TYPE_JSON
      expiration_date: "2519-04-01T08:45:00Z"
"#
    );
    ConfigParser::new().parse_yaml(&yaml, None).expect("declarations parse")
}

fn store(dir: &TempDir) -> LocalStateStore {
    LocalStateStore::with_state_path(dir.path().join("state.json"))
}

#[tokio::test]
async fn test_second_apply_changes_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let store = store(&dir);
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let config = declarations("[ORG_OWNER_VIEWER]");
    let reconciler = Reconciler::new(&config, &store, &ctx);

    let first = reconciler.reconcile().await.expect("first apply");
    assert!(first.success);
    assert_eq!(first.created, 2);

    fake.reset_calls();
    let second = reconciler.reconcile().await.expect("second apply");

    assert!(second.success);
    assert_eq!((second.created, second.updated, second.deleted), (0, 0, 0));
    assert_eq!(second.unchanged, 2);
    assert!(fake.mutations().is_empty());
}

#[tokio::test]
async fn test_remote_role_change_is_reported_and_reverted() {
    let dir = TempDir::new().expect("temp dir");
    let store = store(&dir);
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let config = declarations("[ORG_OWNER_VIEWER]");
    let reconciler = Reconciler::new(&config, &store, &ctx);
    reconciler.reconcile().await.expect("apply");

    fake.set_member_roles(ORG_MEMBERS, "42", &["ORG_OWNER"]);

    let drift = reconciler.check_drift().await.expect("drift");
    assert!(drift.has_drift);
    assert_eq!(drift.drifted_resources.len(), 1);
    assert_eq!(drift.drifted_resources[0].name, "ops-viewer");
    assert_eq!(drift.drifted_resources[0].fields, vec![String::from("roles")]);

    let result = reconciler.reconcile().await.expect("apply");
    assert_eq!(result.updated, 1);
    assert_eq!(
        fake.member_roles(ORG_MEMBERS, "42"),
        Some(vec![String::from("ORG_OWNER_VIEWER")])
    );
}

#[tokio::test]
async fn test_remotely_deleted_entity_is_recreated() {
    let dir = TempDir::new().expect("temp dir");
    let store = store(&dir);
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let config = declarations("[ORG_OWNER_VIEWER]");
    let reconciler = Reconciler::new(&config, &store, &ctx);
    reconciler.reconcile().await.expect("apply");

    fake.remove_member(ORG_MEMBERS, "42");

    let refresh = reconciler.refresh().await.expect("refresh");
    assert_eq!(refresh.gone, vec![String::from("ops-viewer")]);

    let result = reconciler.reconcile().await.expect("apply");
    assert_eq!(result.created, 1);
    assert!(fake.member_roles(ORG_MEMBERS, "42").is_some());
}

#[tokio::test]
async fn test_destroy_removes_every_entity() {
    let dir = TempDir::new().expect("temp dir");
    let store = store(&dir);
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let config = declarations("[ORG_OWNER_VIEWER]");
    let reconciler = Reconciler::new(&config, &store, &ctx);

    let applied = reconciler.reconcile().await.expect("apply");
    let key_id = applied
        .final_state
        .as_ref()
        .and_then(|s| s.get("ci-key"))
        .map(|r| r.id().to_string())
        .expect("key recorded");

    let destroyed = reconciler.destroy_all().await.expect("destroy");

    assert!(destroyed.success);
    assert!(fake.member_roles(ORG_MEMBERS, "42").is_none());
    assert!(!fake.key_exists(&key_id));
    let state = store.load_or_default().await.expect("load");
    assert!(state.present().is_empty());
}

#[tokio::test]
async fn test_imported_member_needs_no_changes() {
    let dir = TempDir::new().expect("temp dir");
    let store = store(&dir);
    let fake = FakeZitadel::new();
    fake.set_member_roles(ORG_MEMBERS, "42", &["ORG_OWNER_VIEWER"]);
    let ctx = fake.context();
    let config = declarations("[ORG_OWNER_VIEWER]");
    let reconciler = Reconciler::new(&config, &store, &ctx);

    reconciler
        .import("ops-viewer", ResourceKind::OrgMember, "42")
        .await
        .expect("import");
    let (diff, plan) = reconciler.plan().await.expect("plan");

    let member = diff.diffs.iter().find(|d| d.name == "ops-viewer").expect("member diff");
    assert_eq!(member.diff_type.to_string(), "no change");
    assert_eq!(plan.action_count(), 1);
}

#[tokio::test]
async fn test_plan_output_never_shows_secrets() {
    let dir = TempDir::new().expect("temp dir");
    let store = store(&dir);
    let fake = FakeZitadel::new();
    let ctx = fake.context();
    let config = ConfigParser::new()
        .parse_yaml(
            r#"
provider:
  domain: zitadel.test
resources:
  - name: azure
    kind: zitadel_org_idp_azure_ad
    attributes:
      name: Azure
      client_id: "9f1c"
      client_secret: hunter2
"#,
            None,
        )
        .expect("declarations parse");
    let reconciler = Reconciler::new(&config, &store, &ctx).with_refresh(false);

    let (diff, plan) = reconciler.plan().await.expect("plan");

    for format in [OutputFormat::Text, OutputFormat::Json] {
        let output = OutputFormatter::new(format).format_plan(&plan, &diff, true);
        assert!(output.contains("client_secret"));
        assert!(!output.contains("hunter2"));
    }
    assert_eq!(fake.call_count(), 0);
}
