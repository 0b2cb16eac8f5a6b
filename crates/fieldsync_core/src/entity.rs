//! Entity tables: write-through puts and deletes, inbound remote writes,
//! status bookkeeping.

use crate::error::{CoreError, CoreResult};
use crate::journal::Batch;
use crate::store::LocalStore;
use crate::tables::Tables;
use fieldsync_protocol::{
    ContentHash, EntityId, EntityRecord, EntityType, OperationKind, Payload, Priority,
    RemoteRecord, StatusSnapshot, SyncStatus,
};
use std::collections::BTreeSet;
use tracing::debug;

impl LocalStore {
    /// Writes an entity locally and queues its upload in the same commit.
    ///
    /// The record is stamped with the current time, its hash recomputed and
    /// its status reset to `Pending`. An entity waiting for a conflict
    /// decision stays in `Conflict`; the open case picks up the new local
    /// data.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn put(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: Payload,
        priority: Priority,
    ) -> CoreResult<EntityRecord> {
        self.write(|tables, batch| {
            Ok(stage_local_write(
                tables,
                batch,
                entity_type,
                id,
                payload,
                priority,
            ))
        })
    }

    /// Writes data received from the remote without queueing an upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn put_synced(
        &self,
        entity_type: &EntityType,
        remote: &RemoteRecord,
    ) -> CoreResult<EntityRecord> {
        self.write(|_, batch| {
            let record = EntityRecord::from_remote(entity_type.clone(), remote);
            batch.put_entity(record.clone());
            Ok(record)
        })
    }

    /// Deletes an entity locally and queues the remote delete.
    ///
    /// Returns false if the entity did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn delete(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        priority: Priority,
    ) -> CoreResult<bool> {
        self.write(|tables, batch| {
            if tables.entity(entity_type, id).is_none() {
                return Ok(false);
            }
            batch.remove_entity(entity_type, id);
            batch.enqueue(OperationKind::Delete, entity_type, id, None, priority);
            if let Some(case) = tables.open_conflict_for(entity_type, id) {
                let mut case = case.clone();
                case.resolve(fieldsync_protocol::ConflictSide::Local, batch.now());
                batch.put_conflict(case);
            }
            Ok(true)
        })
    }

    /// Removes an entity the remote deleted, without queueing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn remove_synced(&self, entity_type: &EntityType, id: EntityId) -> CoreResult<bool> {
        self.write(|tables, batch| {
            if tables.entity(entity_type, id).is_none() {
                return Ok(false);
            }
            batch.remove_entity(entity_type, id);
            Ok(true)
        })
    }

    /// Applies a remote version in one commit, but only if the local record
    /// is still `expected`.
    ///
    /// `expected` is the record the caller inspected, or `None` if it saw
    /// none. A remote deletion removes the record; anything else replaces
    /// it without queueing an upload. Returns false and writes nothing when
    /// a local change landed in between, or when `expected` is `None` and a
    /// local delete is queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn apply_remote_if_unchanged(
        &self,
        entity_type: &EntityType,
        remote: &RemoteRecord,
        expected: Option<&EntityRecord>,
    ) -> CoreResult<bool> {
        self.write(|tables, batch| {
            let current = tables.entity(entity_type, remote.id);
            if current != expected {
                debug!(%entity_type, id = %remote.id, "local change landed before remote apply");
                return Ok(false);
            }
            if current.is_none()
                && tables
                    .ops_for(entity_type, remote.id)
                    .any(|op| op.kind == OperationKind::Delete)
            {
                return Ok(false);
            }
            if remote.deleted {
                if current.is_some() {
                    batch.remove_entity(entity_type, remote.id);
                }
            } else {
                batch.put_entity(EntityRecord::from_remote(entity_type.clone(), remote));
            }
            Ok(true)
        })
    }

    /// Returns an entity.
    #[must_use]
    pub fn get(&self, entity_type: &EntityType, id: EntityId) -> Option<EntityRecord> {
        self.tables.read().entity(entity_type, id).cloned()
    }

    /// Returns every entity of a type, ordered by id.
    #[must_use]
    pub fn get_all(&self, entity_type: &EntityType) -> Vec<EntityRecord> {
        self.tables
            .read()
            .entities
            .get(entity_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Entity types with at least one stored record.
    #[must_use]
    pub fn entity_types(&self) -> Vec<EntityType> {
        self.tables
            .read()
            .entities
            .iter()
            .filter(|(_, table)| !table.is_empty())
            .map(|(ty, _)| ty.clone())
            .collect()
    }

    /// Entities of every type in the given status.
    #[must_use]
    pub fn entities_with_status(&self, status: SyncStatus) -> Vec<EntityRecord> {
        self.tables
            .read()
            .all_entities()
            .filter(|r| r.sync_status == status)
            .cloned()
            .collect()
    }

    /// Counts entities per status.
    #[must_use]
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let tables = self.tables.read();
        let mut snapshot = StatusSnapshot::default();
        for record in tables.all_entities() {
            snapshot.count(record.sync_status);
        }
        drop(tables);
        snapshot.last_sync = self.last_sync();
        snapshot
    }

    /// Moves an entity to a new status.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing or the lifecycle does not
    /// allow the transition.
    pub fn set_status(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        status: SyncStatus,
    ) -> CoreResult<()> {
        self.write(|tables, batch| {
            let mut record = tables
                .entity(entity_type, id)
                .cloned()
                .ok_or_else(|| CoreError::entity_not_found(entity_type, id))?;
            if record.sync_status == status {
                return Ok(());
            }
            record.sync_status = record.sync_status.transition(status)?;
            if status == SyncStatus::Syncing {
                record.last_sync_attempt = Some(batch.now());
            }
            batch.put_entity(record);
            Ok(())
        })
    }

    /// Replaces an entity with `payload`, dropping every queued operation
    /// for it and queueing a single fresh upload.
    ///
    /// Used when a decision supersedes earlier local intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn supersede(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: Payload,
        priority: Priority,
    ) -> CoreResult<EntityRecord> {
        self.write(|tables, batch| {
            let discarded = stage_discard_ops(tables, batch, entity_type, id);
            let record = stage_forced_write(tables, batch, entity_type, id, payload, priority);
            debug!(%entity_type, %id, discarded, "superseded queued operations");
            Ok(record)
        })
    }

    /// Makes sure an entity is `Pending` with at least one queued upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing or the commit fails.
    pub fn requeue(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        priority: Priority,
    ) -> CoreResult<EntityRecord> {
        self.write(|tables, batch| {
            let record = tables
                .entity(entity_type, id)
                .cloned()
                .ok_or_else(|| CoreError::entity_not_found(entity_type, id))?;
            if tables.ops_for(entity_type, id).next().is_some()
                && record.sync_status == SyncStatus::Pending
            {
                return Ok(record);
            }
            let payload = record.payload.clone();
            Ok(stage_forced_write(tables, batch, entity_type, id, payload, priority))
        })
    }

    /// Moves every `Error` entity back to `Pending` with a cleared retry
    /// count, queueing an upload for those with nothing queued. Failed
    /// deletes of entities already gone locally are queued again, and the
    /// failed list is cleared.
    ///
    /// Returns the number of entities reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn reset_failed(&self, priority: Priority) -> CoreResult<usize> {
        self.write(|tables, batch| {
            let mut reset = 0;
            for record in tables.all_entities() {
                if record.sync_status != SyncStatus::Error {
                    continue;
                }
                let mut record = record.clone();
                record.sync_status = SyncStatus::Pending;
                record.retry_count = 0;
                record.last_error = None;
                if tables.ops_for(&record.entity_type, record.id).next().is_none() {
                    batch.enqueue(
                        upload_kind(&record),
                        &record.entity_type,
                        record.id,
                        Some(record.payload.clone()),
                        priority,
                    );
                }
                batch.put_entity(record);
                reset += 1;
            }

            let mut requeued = BTreeSet::new();
            for op in tables.failed.values() {
                batch.remove_failed_op(op.id);
                let orphaned = op.kind == OperationKind::Delete
                    && tables.entity(&op.entity_type, op.entity_id).is_none()
                    && tables.ops_for(&op.entity_type, op.entity_id).next().is_none();
                if orphaned && requeued.insert((op.entity_type.clone(), op.entity_id)) {
                    batch.enqueue(
                        OperationKind::Delete,
                        &op.entity_type,
                        op.entity_id,
                        None,
                        priority,
                    );
                    reset += 1;
                }
            }
            Ok(reset)
        })
    }
}

/// Create for records the remote has never confirmed, Update otherwise.
fn upload_kind(record: &EntityRecord) -> OperationKind {
    if record.remote_updated_at.is_some() {
        OperationKind::Update
    } else {
        OperationKind::Create
    }
}

pub(crate) fn stage_local_write(
    tables: &Tables,
    batch: &mut Batch,
    entity_type: &EntityType,
    id: EntityId,
    payload: Payload,
    priority: Priority,
) -> EntityRecord {
    let existing = tables.entity(entity_type, id);
    let kind = match existing {
        Some(record) => upload_kind(record),
        None => OperationKind::Create,
    };
    let record = match existing {
        Some(previous) => {
            let mut record = previous.clone();
            record.content_hash = ContentHash::of(&payload);
            record.payload = payload.clone();
            record.last_modified = batch.now();
            record.retry_count = 0;
            record.last_error = None;
            if record.sync_status != SyncStatus::Conflict {
                record.sync_status = SyncStatus::Pending;
            }
            record
        }
        None => EntityRecord::new_local(entity_type.clone(), id, payload.clone(), batch.now()),
    };

    if record.sync_status == SyncStatus::Conflict {
        if let Some(case) = tables.open_conflict_for(entity_type, id) {
            let mut case = case.clone();
            case.local_data = payload.clone();
            case.local_modified = batch.now();
            batch.put_conflict(case);
        }
    }

    batch.put_entity(record.clone());
    batch.enqueue(kind, entity_type, id, Some(payload), priority);
    record
}

/// Writes `payload` as a pending local change regardless of conflict state.
pub(crate) fn stage_forced_write(
    tables: &Tables,
    batch: &mut Batch,
    entity_type: &EntityType,
    id: EntityId,
    payload: Payload,
    priority: Priority,
) -> EntityRecord {
    let existing = tables.entity(entity_type, id);
    let kind = existing.map_or(OperationKind::Create, upload_kind);
    let mut record = match existing {
        Some(previous) => previous.clone(),
        None => EntityRecord::new_local(entity_type.clone(), id, payload.clone(), batch.now()),
    };
    record.content_hash = ContentHash::of(&payload);
    record.payload = payload.clone();
    record.last_modified = batch.now();
    record.sync_status = SyncStatus::Pending;
    record.retry_count = 0;
    record.last_error = None;

    batch.put_entity(record.clone());
    batch.enqueue(kind, entity_type, id, Some(payload), priority);
    record
}

pub(crate) fn stage_discard_ops(
    tables: &Tables,
    batch: &mut Batch,
    entity_type: &EntityType,
    id: EntityId,
) -> usize {
    let ids: Vec<_> = tables.ops_for(entity_type, id).map(|op| op.id).collect();
    for op_id in &ids {
        batch.remove_op(*op_id);
    }
    ids.len()
}

#[cfg(test)]
mod tests {
    use crate::LocalStore;
    use fieldsync_protocol::{
        EntityId, EntityType, OperationKind, Payload, Priority, RemoteRecord, SyncStatus,
    };
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn forms() -> EntityType {
        EntityType::from("forms")
    }

    #[test]
    fn put_is_pending_and_enqueues_create() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        let record = store
            .put(&forms(), id, payload(json!({"title": "A"})), Priority::Normal)
            .unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);

        let ops = store.ops_for_entity(&forms(), id);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Create);
    }

    #[test]
    fn second_put_before_upload_is_still_create() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, payload(json!({"v": 1})), Priority::Normal).unwrap();
        store.put(&forms(), id, payload(json!({"v": 2})), Priority::Normal).unwrap();

        let kinds: Vec<_> = store.ops_for_entity(&forms(), id).iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Create, OperationKind::Create]);
        assert_eq!(store.get(&forms(), id).unwrap().payload, payload(json!({"v": 2})));
    }

    #[test]
    fn put_after_remote_confirmation_is_update() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        let remote = RemoteRecord {
            id,
            payload: payload(json!({"v": 1})),
            updated_at: 10,
            deleted: false,
        };
        store.put_synced(&forms(), &remote).unwrap();
        assert_eq!(store.queue_len(), 0);

        store.put(&forms(), id, payload(json!({"v": 2})), Priority::Normal).unwrap();
        let ops = store.ops_for_entity(&forms(), id);
        assert_eq!(ops[0].kind, OperationKind::Update);
        assert_eq!(store.get(&forms(), id).unwrap().sync_status, SyncStatus::Pending);
    }

    #[test]
    fn delete_removes_and_enqueues() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();

        assert!(store.delete(&forms(), id, Priority::Normal).unwrap());
        assert!(store.get(&forms(), id).is_none());
        assert!(store.has_pending_delete(&forms(), id));
        assert!(!store.delete(&forms(), id, Priority::Normal).unwrap());
    }

    #[test]
    fn set_status_checks_lifecycle() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();

        store.set_status(&forms(), id, SyncStatus::Syncing).unwrap();
        store.set_status(&forms(), id, SyncStatus::Synced).unwrap();
        assert!(store.set_status(&forms(), id, SyncStatus::Syncing).is_err());
        assert!(store
            .set_status(&forms(), EntityId::new(), SyncStatus::Pending)
            .is_err());
    }

    #[test]
    fn supersede_drops_queued_ops() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, payload(json!({"v": 1})), Priority::Normal).unwrap();
        store.put(&forms(), id, payload(json!({"v": 2})), Priority::Normal).unwrap();

        store
            .supersede(&forms(), id, payload(json!({"v": 9})), Priority::High)
            .unwrap();
        let ops = store.ops_for_entity(&forms(), id);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].payload, Some(payload(json!({"v": 9}))));
        assert_eq!(ops[0].priority, Priority::High);
    }

    #[test]
    fn snapshot_counts_statuses() {
        let store = LocalStore::open_in_memory().unwrap();
        let a = EntityId::new();
        store.put(&forms(), a, Payload::new(), Priority::Normal).unwrap();
        store
            .put_synced(
                &"equipment".into(),
                &RemoteRecord {
                    id: EntityId::new(),
                    payload: Payload::new(),
                    updated_at: 1,
                    deleted: false,
                },
            )
            .unwrap();

        let snapshot = store.status_snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.pending, 1);
        assert_eq!(snapshot.synced, 1);
        assert_eq!(store.entity_types().len(), 2);
    }

    fn remote(id: EntityId, value: serde_json::Value, updated_at: i64) -> RemoteRecord {
        RemoteRecord {
            id,
            payload: payload(value),
            updated_at,
            deleted: false,
        }
    }

    #[test]
    fn remote_apply_skips_record_edited_since_read() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put_synced(&forms(), &remote(id, json!({"v": 1}), 10)).unwrap();
        let seen = store.get(&forms(), id).unwrap();

        store.put(&forms(), id, payload(json!({"v": "local"})), Priority::Normal).unwrap();
        let applied = store
            .apply_remote_if_unchanged(&forms(), &remote(id, json!({"v": 2}), 20), Some(&seen))
            .unwrap();

        assert!(!applied);
        let record = store.get(&forms(), id).unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.payload, payload(json!({"v": "local"})));
        assert_eq!(store.ops_for_entity(&forms(), id).len(), 1);
    }

    #[test]
    fn remote_apply_writes_unchanged_record() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put_synced(&forms(), &remote(id, json!({"v": 1}), 10)).unwrap();
        let seen = store.get(&forms(), id).unwrap();

        assert!(store
            .apply_remote_if_unchanged(&forms(), &remote(id, json!({"v": 2}), 20), Some(&seen))
            .unwrap());
        let record = store.get(&forms(), id).unwrap();
        assert_eq!(record.payload, payload(json!({"v": 2})));
        assert_eq!(record.remote_updated_at, Some(20));

        let seen = store.get(&forms(), id).unwrap();
        let mut gone = remote(id, json!({}), 30);
        gone.deleted = true;
        assert!(store.apply_remote_if_unchanged(&forms(), &gone, Some(&seen)).unwrap());
        assert!(store.get(&forms(), id).is_none());
    }

    #[test]
    fn remote_apply_skips_record_created_since_read() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, payload(json!({"v": "local"})), Priority::Normal).unwrap();

        let applied = store
            .apply_remote_if_unchanged(&forms(), &remote(id, json!({"v": 2}), 20), None)
            .unwrap();

        assert!(!applied);
        assert_eq!(store.get(&forms(), id).unwrap().payload, payload(json!({"v": "local"})));
    }
}
