//! Remote command reconciliation, mirroring and health reporting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use assert_matches::assert_matches;
use common::{device, id, Harness};
use gatehouse_core::{AuditOutcome, CredentialSet, RemotePath};
use gatehouse_engine::{CommandDisposition, CommandKind, ValidationError};
use gatehouse_testkit::MemoryRegistryStorage;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn seeded(set: CredentialSet, raw: &str, label: &str) -> Harness {
    let storage = Arc::new(MemoryRegistryStorage::new());
    storage.seed(set, &id(raw), label);
    Harness::with_storage(storage)
}

fn command_errors(h: &Harness) -> Vec<serde_json::Value> {
    h.remote
        .children(&RemotePath::device(&device()).child("commandErrors"))
        .into_values()
        .collect()
}

#[tokio::test]
async fn startup_mirror_publishes_registry() {
    let storage = Arc::new(MemoryRegistryStorage::new());
    storage.seed(CredentialSet::Allow, &id("AABBCCDD"), "Alice");
    storage.seed(CredentialSet::Deny, &id("DEADBEEF"), "Mallory");
    let mut h = Harness::with_storage(storage);

    let report = h.network().await;
    assert!(report.connected);
    assert_eq!(report.mirrored, 2);
    assert_eq!(
        h.remote.get(&h.entry_path(CredentialSet::Deny, "DEADBEEF")).unwrap()["label"],
        "Mallory"
    );

    // Only once per start.
    h.remote.clear_journal();
    h.network().await;
    assert!(!h
        .remote
        .sent_paths()
        .iter()
        .any(|p| p.ends_with("/allow/AABBCCDD")));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let mut h = seeded(CredentialSet::Allow, "AABBCCDD", "Alice");
    h.network().await;
    h.remote.clear_journal();

    let payload = json!({"set": "allow", "identifier": "AABBCCDD"});
    let handled = h.apply("delete", payload.clone()).await;
    assert_eq!(handled, (CommandKind::Delete, CommandDisposition::Applied));
    assert!(!h.node.registry.contains(CredentialSet::Allow, &id("AABBCCDD")));
    let entry = h.entry_path(CredentialSet::Allow, "AABBCCDD");
    assert!(h.remote.deleted_paths().contains(&entry.to_string()));
    assert_eq!(h.remote.get(&entry), None);

    h.remote.clear_journal();
    let handled = h.apply("delete", payload).await;
    assert_eq!(handled, (CommandKind::Delete, CommandDisposition::Applied));
    assert_eq!(
        h.remote.deleted_paths(),
        vec![h.command_path("delete").to_string()]
    );
    assert!(command_errors(&h).is_empty());
}

#[tokio::test]
async fn move_to_same_set_is_reported() {
    let mut h = seeded(CredentialSet::Allow, "AABBCCDD", "Alice");
    let payload = json!({"from": "allow", "to": "Allow", "identifier": "AABBCCDD"});
    let (_, disposition) = h.apply("move", payload.clone()).await;
    assert_eq!(
        disposition,
        CommandDisposition::Rejected(ValidationError::NoOpMove(CredentialSet::Allow))
    );

    assert_eq!(h.remote.get(&h.command_path("move")), None);
    assert_eq!(
        h.node.registry.membership(&id("AABBCCDD")),
        vec![CredentialSet::Allow]
    );
    let errors = command_errors(&h);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["command"], "move");
    assert_eq!(errors[0]["originalPayload"], payload);

    let record = h.audit_today().pop().unwrap();
    assert_eq!(record.outcome, AuditOutcome::Error);
    assert_eq!(record.identifier, "AABBCCDD");
}

#[tokio::test]
async fn move_keeps_sets_disjoint() {
    let mut h = seeded(CredentialSet::Pending, "11223344", "Unknown");
    h.network().await;

    let handled = h
        .apply(
            "move",
            json!({"from": "pending", "to": "allow", "identifier": "11223344", "label": "Bob"}),
        )
        .await;
    assert_eq!(handled, (CommandKind::Move, CommandDisposition::Applied));
    assert_eq!(
        h.node.registry.membership(&id("11223344")),
        vec![CredentialSet::Allow]
    );
    assert_eq!(
        h.node.registry.label_of(&id("11223344"), CredentialSet::Allow).as_str(),
        "Bob"
    );
    assert_eq!(h.remote.get(&h.entry_path(CredentialSet::Pending, "11223344")), None);
    assert_eq!(
        h.remote.get(&h.entry_path(CredentialSet::Allow, "11223344")).unwrap()["label"],
        "Bob"
    );
}

#[tokio::test]
async fn add_replaces_membership_in_other_sets() {
    let mut h = seeded(CredentialSet::Deny, "AABBCCDD", "Alice");
    h.apply("add", json!({"set": "allow", "identifier": "AABBCCDD"}))
        .await;
    assert_eq!(
        h.node.registry.membership(&id("AABBCCDD")),
        vec![CredentialSet::Allow]
    );
    // Label carried over when the command has none.
    assert_eq!(
        h.node.registry.label_of(&id("AABBCCDD"), CredentialSet::Allow).as_str(),
        "Alice"
    );
    assert!(h.storage.snapshot(CredentialSet::Deny).is_empty());
}

#[tokio::test]
async fn rename_of_absent_identifier_is_rejected() {
    let mut h = Harness::new();
    let (_, disposition) = h
        .apply(
            "rename",
            json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice"}),
        )
        .await;
    assert_matches!(
        disposition,
        CommandDisposition::Rejected(ValidationError::NotInSet { .. })
    );
    assert!(h.node.registry.membership(&id("AABBCCDD")).is_empty());
    assert_eq!(command_errors(&h).len(), 1);
}

#[tokio::test]
async fn rename_updates_label() {
    let mut h = seeded(CredentialSet::Allow, "AABBCCDD", "Alice");
    let handled = h
        .apply(
            "rename",
            json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice Smith"}),
        )
        .await;
    assert_eq!(handled, (CommandKind::Rename, CommandDisposition::Applied));
    assert_eq!(
        h.storage.snapshot(CredentialSet::Allow)[&id("AABBCCDD")].label.as_str(),
        "Alice Smith"
    );
}

#[tokio::test]
async fn invalid_payloads_are_reported() {
    let mut h = Harness::new();

    let (_, disposition) = h.apply("unlock", json!({"duration_seconds": 0})).await;
    assert_matches!(
        disposition,
        CommandDisposition::Rejected(ValidationError::DurationOutOfRange { seconds: 0, .. })
    );
    let (_, disposition) = h
        .apply("add", json!({"set": "guests", "identifier": "AABBCCDD"}))
        .await;
    assert_matches!(
        disposition,
        CommandDisposition::Rejected(ValidationError::UnknownSet(_))
    );
    let (_, disposition) = h
        .apply("delete", json!({"set": "allow", "identifier": "XYZ"}))
        .await;
    assert_matches!(
        disposition,
        CommandDisposition::Rejected(ValidationError::MalformedIdentifier { .. })
    );

    assert_eq!(command_errors(&h).len(), 3);
    assert!(h.remote.children(&RemotePath::device(&device()).child("commands")).is_empty());
}

#[tokio::test]
async fn stale_marker_is_not_applied() {
    let mut h = Harness::new();
    let first = json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice", "submittedAt": 100});
    assert_eq!(h.apply("add", first).await.1, CommandDisposition::Applied);

    let replay = json!({"set": "allow", "identifier": "AABBCCDD", "label": "Mallory", "submittedAt": 100});
    assert_eq!(h.apply("add", replay).await.1, CommandDisposition::Stale);
    assert_eq!(h.remote.get(&h.command_path("add")), None);
    assert_eq!(
        h.node.registry.label_of(&id("AABBCCDD"), CredentialSet::Allow).as_str(),
        "Alice"
    );

    let newer = json!({"set": "allow", "identifier": "AABBCCDD", "label": "Carol", "submittedAt": "101"});
    assert_eq!(h.apply("add", newer).await.1, CommandDisposition::Applied);
    assert_eq!(
        h.node.registry.label_of(&id("AABBCCDD"), CredentialSet::Allow).as_str(),
        "Carol"
    );
}

#[tokio::test]
async fn failed_removal_defers_the_command() {
    let mut h = Harness::new();
    h.remote.fail_deletes(true);
    let handled = h
        .apply("add", json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice"}))
        .await;
    assert_eq!(handled, (CommandKind::Add, CommandDisposition::RemovalFailed));
    assert!(h.node.registry.membership(&id("AABBCCDD")).is_empty());
    assert!(h.remote.get(&h.command_path("add")).is_some());

    h.remote.fail_deletes(false);
    let mut report = h.network().await;
    assert_eq!(
        report.commands.remove(0),
        (CommandKind::Add, CommandDisposition::Applied)
    );
    assert!(h.node.registry.contains(CredentialSet::Allow, &id("AABBCCDD")));
}

#[tokio::test]
async fn registry_write_failure_is_reported_after_removal() {
    let mut h = Harness::new();
    h.storage.fail_writes(true);
    let handled = h
        .apply("add", json!({"set": "allow", "identifier": "AABBCCDD"}))
        .await;
    assert_eq!(handled, (CommandKind::Add, CommandDisposition::ApplyFailed));
    assert_eq!(h.remote.get(&h.command_path("add")), None);
    assert!(h.node.registry.membership(&id("AABBCCDD")).is_empty());
    assert_eq!(command_errors(&h).len(), 1);
}

#[tokio::test]
async fn commands_run_in_fixed_order() {
    let mut h = Harness::new();
    h.command("rename", json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice B"}));
    h.command("add", json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice"}));
    h.command("unlock", json!({"duration_seconds": 3}));

    let report = h.network().await;
    let kinds: Vec<_> = report.commands.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(
        kinds,
        vec![CommandKind::Unlock, CommandKind::Add, CommandKind::Rename]
    );
    assert!(report
        .commands
        .iter()
        .all(|(_, d)| *d == CommandDisposition::Applied));
    assert_eq!(
        h.node.registry.label_of(&id("AABBCCDD"), CredentialSet::Allow).as_str(),
        "Alice B"
    );
}

#[tokio::test]
async fn offline_cycle_is_skipped_and_resumes() {
    let mut h = Harness::new();
    h.remote.set_connected(false);
    h.command("add", json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice"}));
    h.scan("11223344");

    let report = h.network().await;
    assert!(!report.connected);
    assert!(report.commands.is_empty());
    assert!(!h.node.processor.is_online());
    assert!(h.remote.sent_paths().is_empty());

    h.remote.set_connected(true);
    let report = h.network().await;
    assert!(report.connected);
    assert_eq!(
        report.commands,
        vec![(CommandKind::Add, CommandDisposition::Applied)]
    );
    let logs = h
        .remote
        .children(&RemotePath::device(&device()).child("logs"));
    assert!(logs
        .values()
        .any(|log| log["identifier"] == "11223344" && log["device"] == "door-1"));
}

#[tokio::test]
async fn failed_mirror_send_is_retried() {
    let mut h = Harness::new();
    h.network().await;
    h.scan("11223344");

    h.remote.fail_sends(true);
    let report = h.network().await;
    assert_eq!(report.mirrored, 0);

    h.remote.fail_sends(false);
    let report = h.network().await;
    // Pending entry and its audit record.
    assert_eq!(report.mirrored, 2);
    assert!(h
        .remote
        .get(&h.entry_path(CredentialSet::Pending, "11223344"))
        .is_some());
}

#[tokio::test]
async fn placed_identifier_is_not_mirrored_as_pending() {
    let mut h = Harness::new();
    h.network().await;
    h.scan("1234ABCD");

    // The notice from the scan is still queued when the add is applied.
    let handled = h
        .apply(
            "add",
            json!({"set": "allow", "identifier": "1234ABCD", "label": "Bob"}),
        )
        .await;
    assert_eq!(handled, (CommandKind::Add, CommandDisposition::Applied));
    assert_eq!(
        h.node.registry.membership(&id("1234ABCD")),
        vec![CredentialSet::Allow]
    );
    assert_eq!(h.remote.get(&h.entry_path(CredentialSet::Pending, "1234ABCD")), None);
    assert_eq!(
        h.remote.get(&h.entry_path(CredentialSet::Allow, "1234ABCD")).unwrap()["label"],
        "Bob"
    );

    h.network().await;
    assert_eq!(h.remote.get(&h.entry_path(CredentialSet::Pending, "1234ABCD")), None);
}

#[tokio::test]
async fn failed_entry_mirror_is_retried() {
    let mut h = Harness::new();
    h.network().await;

    h.remote.fail_sends(true);
    let handled = h
        .apply(
            "add",
            json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice"}),
        )
        .await;
    assert_eq!(handled, (CommandKind::Add, CommandDisposition::Applied));
    let allow_path = h.entry_path(CredentialSet::Allow, "AABBCCDD");
    assert_eq!(h.remote.get(&allow_path), None);

    h.remote.fail_sends(false);
    h.network().await;
    assert!(h.node.registry.contains(CredentialSet::Allow, &id("AABBCCDD")));
    assert_eq!(h.remote.get(&allow_path).unwrap()["label"], "Alice");
}

#[tokio::test]
async fn entry_retry_publishes_current_membership() {
    let mut h = Harness::new();
    h.network().await;

    h.remote.fail_sends(true);
    h.apply(
        "add",
        json!({"set": "allow", "identifier": "AABBCCDD", "label": "Alice"}),
    )
    .await;
    // Deletes still go through; the queued retry must not resurrect the entry.
    let handled = h
        .apply("delete", json!({"set": "allow", "identifier": "AABBCCDD"}))
        .await;
    assert_eq!(handled, (CommandKind::Delete, CommandDisposition::Applied));

    h.remote.fail_sends(false);
    h.network().await;
    assert!(h.node.registry.membership(&id("AABBCCDD")).is_empty());
    assert_eq!(h.remote.get(&h.entry_path(CredentialSet::Allow, "AABBCCDD")), None);
}

#[tokio::test]
async fn status_report_and_offline_notice() {
    let mut h = Harness::build(Arc::new(MemoryRegistryStorage::new()), |settings| {
        settings.processor.status_interval = Duration::from_secs(60);
        settings.queues.pending_capacity = 1;
    });
    h.remote.set_connected(false);
    h.scan("11223344");
    h.run_control(10);
    h.scan("55667788");
    h.remote.set_connected(true);

    let report = h.network().await;
    assert!(report.status_published);
    let status_path = RemotePath::status(&device());
    let status = h.remote.get(&status_path).unwrap();
    assert_eq!(status["online"], true);
    assert_eq!(status["firmwareVersion"], "1.4.2");
    assert_eq!(status["ip"], "192.0.2.10");
    assert_eq!(status["queueDrops"]["pending"], 1);
    assert_eq!(status["queueDrops"]["total"], 1);

    // Not due again until the interval passes.
    h.clock.advance_ms(1_000);
    assert!(!h.network().await.status_published);
    h.clock.advance_ms(60_000);
    assert!(h.network().await.status_published);

    h.node.processor.shutdown().await;
    assert_eq!(h.remote.get(&status_path).unwrap()["online"], false);
}
