//! On-disk behavior of the local store: replay, locking, encryption,
//! corruption handling and compaction.

use fieldsync_core::{CoreError, LocalStore, StoreConfig};
use fieldsync_protocol::{
    ConflictSide, EntityId, EntityType, OperationKind, Payload, Priority, RemoteRecord,
    SyncStatus,
};
use fieldsync_storage::EncryptionKey;
use serde_json::json;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn forms() -> EntityType {
    EntityType::from("forms")
}

#[test]
fn state_survives_reopen() {
    let dir = tempdir().unwrap();
    let kept = EntityId::new();
    let conflicted = EntityId::new();

    {
        let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
        store
            .put(&forms(), kept, payload(json!({"title": "Pump check"})), Priority::High)
            .unwrap();
        store
            .put(&forms(), conflicted, payload(json!({"status": "ok"})), Priority::Normal)
            .unwrap();
        store.advance_cursor(&forms(), 900).unwrap();
        store.set_last_sync(1_000).unwrap();
        store
            .open_conflict(
                &forms(),
                conflicted,
                &RemoteRecord {
                    id: conflicted,
                    payload: payload(json!({"status": "failed"})),
                    updated_at: 800,
                    deleted: false,
                },
                BTreeSet::from(["status".to_string()]),
            )
            .unwrap();
    }

    let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert_eq!(
        store.get(&forms(), kept).unwrap().payload,
        payload(json!({"title": "Pump check"}))
    );
    assert_eq!(store.queue_len(), 2);
    assert_eq!(store.queued_ops()[0].priority, Priority::High);
    assert_eq!(store.cursor(&forms()), Some(900));
    assert_eq!(store.last_sync(), Some(1_000));
    assert_eq!(store.open_conflicts().len(), 1);
    assert_eq!(
        store.get(&forms(), conflicted).unwrap().sync_status,
        SyncStatus::Conflict
    );
    assert!(store.corruption_report().is_empty());
}

#[test]
fn op_ids_keep_increasing_across_reopen() {
    let dir = tempdir().unwrap();
    let first = {
        let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
        store.put(&forms(), EntityId::new(), Payload::new(), Priority::Normal).unwrap();
        store.queued_ops()[0].id
    };

    let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
    store.put(&forms(), EntityId::new(), Payload::new(), Priority::Normal).unwrap();
    let ids: Vec<_> = store.queued_ops().iter().map(|op| op.id).collect();
    assert!(ids.iter().all(|id| *id >= first));
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn second_open_is_rejected_while_locked() {
    let dir = tempdir().unwrap();
    let _store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert!(matches!(
        LocalStore::open(dir.path(), StoreConfig::default()),
        Err(CoreError::StoreLocked)
    ));
}

#[test]
fn interrupted_upload_recovers_as_pending() {
    let dir = tempdir().unwrap();
    let id = EntityId::new();
    {
        let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        store.set_status(&forms(), id, SyncStatus::Syncing).unwrap();
    }

    let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert_eq!(store.get(&forms(), id).unwrap().sync_status, SyncStatus::Pending);
    assert_eq!(store.queue_len(), 1);
}

#[test]
fn torn_tail_is_reported_and_earlier_writes_kept() {
    let dir = tempdir().unwrap();
    let id = EntityId::new();
    {
        let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
        store.put(&forms(), id, payload(json!({"v": 1})), Priority::Normal).unwrap();
    }
    {
        let mut journal = OpenOptions::new()
            .append(true)
            .open(dir.path().join("journal.log"))
            .unwrap();
        journal.write_all(b"FS\x40\x00\x00\x00garbage").unwrap();
    }

    {
        let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.corruption_report().len(), 1);
        assert!(store.get(&forms(), id).is_some());
        store.put(&forms(), id, payload(json!({"v": 2})), Priority::Normal).unwrap();
    }

    let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert!(store.corruption_report().is_empty());
    assert_eq!(store.get(&forms(), id).unwrap().payload, payload(json!({"v": 2})));
}

#[test]
fn compaction_preserves_state() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::default().compact_threshold(5);
    let id = EntityId::new();
    {
        let store = LocalStore::open(dir.path(), config.clone()).unwrap();
        for i in 0..10 {
            store.put(&forms(), id, payload(json!({"v": i})), Priority::Normal).unwrap();
        }
        assert!(store.needs_compaction());
        store.compact().unwrap();
        assert_eq!(store.frame_count(), 1);
        assert!(!store.needs_compaction());
    }

    let store = LocalStore::open(dir.path(), config).unwrap();
    assert_eq!(store.get(&forms(), id).unwrap().payload, payload(json!({"v": 9})));
    assert_eq!(store.queue_len(), 10);
}

/// Fills a store past several snapshot frames, with a conflict case and an
/// evicted operation alongside the entities.
fn fill_past_one_frame(store: &LocalStore) -> (Vec<EntityId>, EntityId) {
    let notes = "n".repeat(2_048);
    let ids: Vec<EntityId> = (0..40)
        .map(|i| {
            let id = EntityId::new();
            store
                .put(&forms(), id, payload(json!({"i": i, "notes": notes})), Priority::Normal)
                .unwrap();
            id
        })
        .collect();

    let remote = RemoteRecord {
        id: ids[0],
        payload: payload(json!({"i": "remote"})),
        updated_at: 5,
        deleted: false,
    };
    store
        .open_conflict(&forms(), ids[0], &remote, BTreeSet::from(["i".to_string()]))
        .unwrap();

    let doomed = EntityId::new();
    store.put(&forms(), doomed, payload(json!({"i": -1})), Priority::Critical).unwrap();
    store.delete(&forms(), doomed, Priority::Critical).unwrap();
    for op in store.ops_for_entity(&forms(), doomed) {
        store.nack(op.id, "forbidden", false, 3).unwrap();
    }
    (ids, doomed)
}

#[test]
fn store_larger_than_a_frame_compacts_and_survives_torn_tail() {
    let dir = tempdir().unwrap();
    let key = EncryptionKey::generate();
    let config = StoreConfig::default().snapshot_frame_bytes(16 * 1024);
    let (ids, doomed) = {
        let store = LocalStore::open_encrypted(dir.path(), &key, config.clone()).unwrap();
        let filled = fill_past_one_frame(&store);
        store.compact().unwrap();
        assert!(store.frame_count() > 2);
        filled
    };
    {
        let mut journal = OpenOptions::new()
            .append(true)
            .open(dir.path().join("journal.log"))
            .unwrap();
        journal.write_all(b"FS\x40\x00").unwrap();
    }

    {
        let store = LocalStore::open_encrypted(dir.path(), &key, config.clone()).unwrap();
        assert_eq!(store.corruption_report().len(), 1);
    }

    let store = LocalStore::open_encrypted(dir.path(), &key, config).unwrap();
    assert!(store.corruption_report().is_empty());
    assert_eq!(store.get_all(&forms()).len(), ids.len());
    assert_eq!(store.get(&forms(), ids[0]).unwrap().sync_status, SyncStatus::Conflict);
    assert_eq!(store.open_conflicts().len(), 1);
    assert_eq!(store.queue_len(), ids.len());
    let failed = store.failed_ops();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|op| op.entity_id == doomed));

    let next = store
        .enqueue(OperationKind::Update, &forms(), ids[1], None, Priority::Low)
        .unwrap();
    assert!(failed.iter().all(|op| op.id < next));
}

#[test]
fn encrypted_store_round_trips_and_rejects_wrong_key() {
    let dir = tempdir().unwrap();
    let key = EncryptionKey::generate();
    let id = EntityId::new();
    {
        let store = LocalStore::open_encrypted(dir.path(), &key, StoreConfig::default()).unwrap();
        store
            .put(&forms(), id, payload(json!({"site": "North yard"})), Priority::Normal)
            .unwrap();
    }

    let raw = std::fs::read(dir.path().join("journal.log")).unwrap();
    assert!(!raw.windows(10).any(|w| w == b"North yard"));

    {
        let store = LocalStore::open_encrypted(dir.path(), &key, StoreConfig::default()).unwrap();
        assert!(store.get(&forms(), id).is_some());
    }

    let wrong = EncryptionKey::generate();
    assert!(matches!(
        LocalStore::open_encrypted(dir.path(), &wrong, StoreConfig::default()),
        Err(CoreError::Storage(_))
    ));
}

#[test]
fn resolution_is_durable() {
    let dir = tempdir().unwrap();
    let id = EntityId::new();
    let case_id = {
        let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
        store.put(&forms(), id, payload(json!({"v": "local"})), Priority::Normal).unwrap();
        let case = store
            .open_conflict(
                &forms(),
                id,
                &RemoteRecord {
                    id,
                    payload: payload(json!({"v": "remote"})),
                    updated_at: 1,
                    deleted: false,
                },
                BTreeSet::from(["v".to_string()]),
            )
            .unwrap();
        store
            .resolve_conflict(case.id, ConflictSide::Local, Priority::Normal)
            .unwrap();
        case.id
    };

    let store = LocalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert!(store.conflict(case_id).unwrap().resolved);
    assert_eq!(store.get(&forms(), id).unwrap().sync_status, SyncStatus::Pending);
    assert_eq!(store.ops_for_entity(&forms(), id).len(), 1);
}
