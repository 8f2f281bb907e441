//! Slot migrator tests: protocol ordering, commit propagation, rebalance.

use valkey_slot_admin::slots::{MigrationError, RebalanceOptions, SlotMigrator, SlotSet};

use crate::mock_cluster::{
    clients_for, keys_on, new_sim, op_index, ops, owns, register_owner, seed_keys, snapshot,
};

/// Three masters (one slotless) and one replica.
const TOPOLOGY: &str = "\
aaa a:7000@17000 master,myself - 0 0 1 connected 0-8191
bbb b:7000@17000 master - 0 0 2 connected 8192-16383
ccc c:7000@17000 master - 0 0 3 connected
rrr r:7000@17000 slave aaa 0 0 1 connected
";

#[tokio::test]
async fn test_migrate_slot_command_ordering() {
    let sim = new_sim();
    seed_keys(&sim, "a:7000", 500, 3);
    register_owner(&sim, "a:7000", "aaa", "0-8191");
    register_owner(&sim, "b:7000", "bbb", "8192-16383");
    register_owner(&sim, "c:7000", "ccc", "");
    let clients = clients_for(&sim, &["a:7000", "b:7000", "c:7000"]);

    let migrator = SlotMigrator::new(snapshot(TOPOLOGY), clients);
    let moved = migrator.migrate_slot(500, "bbb").await.unwrap();

    assert_eq!(moved, 3);
    assert_eq!(keys_on(&sim, "a:7000"), 0);
    assert_eq!(keys_on(&sim, "b:7000"), 3);

    // Ownership lands on the destination and leaves the source.
    assert!(!owns(&sim, "a:7000", 500));
    assert!(owns(&sim, "b:7000", 500));
    assert!(owns(&sim, "a:7000", 499));

    let ops = ops(&sim);
    let importing = op_index(&ops, "b:7000 SETSLOT 500 IMPORTING aaa");
    let migrating = op_index(&ops, "a:7000 SETSLOT 500 MIGRATING bbb");
    let transfer = op_index(&ops, "a:7000 MIGRATE 3 -> b:7000");
    let commit_dest = op_index(&ops, "b:7000 SETSLOT 500 NODE bbb");
    let commit_source = op_index(&ops, "a:7000 SETSLOT 500 NODE bbb");
    let propagate = op_index(&ops, "c:7000 SETSLOT 500 NODE bbb");

    // Destination importing before source migrating, keys in the middle,
    // commits on destination then source, then the bystanders.
    assert!(importing < migrating);
    assert!(migrating < transfer);
    assert!(transfer < commit_dest);
    assert!(commit_dest < commit_source);
    assert!(commit_source < propagate);
}

#[tokio::test]
async fn test_migrate_slot_noop_when_dest_owns() {
    let sim = new_sim();
    let clients = clients_for(&sim, &["a:7000", "b:7000", "c:7000"]);
    let migrator = SlotMigrator::new(snapshot(TOPOLOGY), clients);

    let moved = migrator.migrate_slot(9000, "bbb").await.unwrap();

    assert_eq!(moved, 0);
    assert!(ops(&sim).is_empty());
}

#[tokio::test]
async fn test_migrate_slot_unknown_dest() {
    let sim = new_sim();
    let clients = clients_for(&sim, &["a:7000", "b:7000", "c:7000"]);
    let migrator = SlotMigrator::new(snapshot(TOPOLOGY), clients);

    let err = migrator.migrate_slot(500, "zzz").await.unwrap_err();
    assert!(matches!(err, MigrationError::UnknownNode(id) if id == "zzz"));
}

#[tokio::test]
async fn test_migrate_slot_dest_not_master() {
    let sim = new_sim();
    let clients = clients_for(&sim, &["a:7000", "b:7000", "c:7000"]);
    let migrator = SlotMigrator::new(snapshot(TOPOLOGY), clients);

    let err = migrator.migrate_slot(500, "rrr").await.unwrap_err();
    assert!(matches!(err, MigrationError::NotMaster(id) if id == "rrr"));
}

#[tokio::test]
async fn test_migrate_slot_unowned() {
    let sim = new_sim();
    let topology = "\
aaa a:7000@17000 master,myself - 0 0 1 connected 0-100
bbb b:7000@17000 master - 0 0 2 connected 101-199
";
    let clients = clients_for(&sim, &["a:7000", "b:7000"]);
    let migrator = SlotMigrator::new(snapshot(topology), clients);

    let err = migrator.migrate_slot(300, "bbb").await.unwrap_err();
    assert!(matches!(err, MigrationError::UnownedSlot(300)));
}

#[tokio::test]
async fn test_migrate_slot_survives_missing_bystander_client() {
    let sim = new_sim();
    seed_keys(&sim, "a:7000", 500, 2);
    // No client for ccc: propagation to it is skipped with a warning.
    let clients = clients_for(&sim, &["a:7000", "b:7000"]);
    let migrator = SlotMigrator::new(snapshot(TOPOLOGY), clients);

    let moved = migrator.migrate_slot(500, "bbb").await.unwrap();
    assert_eq!(moved, 2);

    let ops = ops(&sim);
    assert!(!ops.iter().any(|op| op.starts_with("c:7000")));
}

const SMALL_TOPOLOGY: &str = "\
aaa a:7000@17000 master,myself - 0 0 1 connected 0-99
bbb b:7000@17000 master - 0 0 2 connected 100-199
";

#[tokio::test]
async fn test_rebalance_migrates_missing_and_skips_owned() {
    let sim = new_sim();
    seed_keys(&sim, "a:7000", 60, 5);
    let clients = clients_for(&sim, &["a:7000", "b:7000"]);
    let migrator = SlotMigrator::new(snapshot(SMALL_TOPOLOGY), clients);

    let target = {
        let mut s = SlotSet::new();
        s.parse_range("50-149").unwrap();
        s
    };

    let summary = migrator
        .rebalance("bbb", &target, &RebalanceOptions::default())
        .await
        .unwrap();

    // 50-99 move over, 100-149 are already bbb's.
    assert_eq!(summary.slots_migrated, 50);
    assert_eq!(summary.slots_skipped, 50);
    assert_eq!(summary.keys_moved, 5);
    assert!(!summary.has_failures());
    assert_eq!(keys_on(&sim, "b:7000"), 5);
}

#[tokio::test]
async fn test_rebalance_continue_on_error_collects_failures() {
    let sim = new_sim();
    seed_keys(&sim, "a:7000", 50, 2);
    seed_keys(&sim, "a:7000", 60, 2);
    sim.lock().unwrap().fail_migrate_at = Some(1);

    let clients = clients_for(&sim, &["a:7000", "b:7000"]);
    let migrator = SlotMigrator::new(snapshot(SMALL_TOPOLOGY), clients);

    let target = {
        let mut s = SlotSet::new();
        s.parse_range("50-99").unwrap();
        s
    };

    let options = RebalanceOptions {
        continue_on_error: true,
    };
    let summary = migrator.rebalance("bbb", &target, &options).await.unwrap();

    // Slot 50's first MIGRATE fails; the remaining 49 slots go through.
    assert_eq!(summary.failed_slots.len(), 1);
    assert_eq!(summary.failed_slots[0].0, 50);
    assert_eq!(summary.slots_migrated, 49);
    assert_eq!(summary.keys_moved, 2);
}

#[tokio::test]
async fn test_rebalance_aborts_on_first_failure_by_default() {
    let sim = new_sim();
    seed_keys(&sim, "a:7000", 50, 2);
    sim.lock().unwrap().fail_migrate_at = Some(1);

    let clients = clients_for(&sim, &["a:7000", "b:7000"]);
    let migrator = SlotMigrator::new(snapshot(SMALL_TOPOLOGY), clients);

    let target = {
        let mut s = SlotSet::new();
        s.parse_range("50-99").unwrap();
        s
    };

    let err = migrator
        .rebalance("bbb", &target, &RebalanceOptions::default())
        .await
        .unwrap_err();

    let MigrationError::Transfer(aborted) = err else {
        panic!("expected transfer error, got {err}");
    };
    assert_eq!(aborted.slot, 50);
    assert_eq!(aborted.moved, 0);
}
