//! The sync queue: ordered draining, acknowledgement and retry accounting.

use crate::error::{CoreError, CoreResult};
use crate::store::LocalStore;
use fieldsync_protocol::{
    EntityId, EntityType, OpId, OperationKind, Payload, Priority, SyncOperation, SyncStatus,
    Timestamp,
};
use tracing::warn;

/// What happened to an operation after a failed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Kept in the queue for another attempt.
    Retained {
        /// Failed attempts so far.
        retry_count: u32,
    },
    /// Removed from the queue and kept in the failed list; the owning
    /// entity, if it still exists, is now `Error`.
    Evicted {
        /// Failed attempts before eviction.
        retry_count: u32,
    },
}

impl NackOutcome {
    /// Returns true if the operation left the queue.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        matches!(self, Self::Evicted { .. })
    }
}

impl LocalStore {
    /// Queues an operation directly.
    ///
    /// Entity writes queue their own operations; this is for callers that
    /// need to re-send something without touching the entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn enqueue(
        &self,
        kind: OperationKind,
        entity_type: &EntityType,
        entity_id: EntityId,
        payload: Option<Payload>,
        priority: Priority,
    ) -> CoreResult<OpId> {
        self.write(|_, batch| Ok(batch.enqueue(kind, entity_type, entity_id, payload, priority)))
    }

    /// Returns up to `limit` operations with fewer than `max_retry` failures,
    /// highest priority first, then oldest first.
    ///
    /// Operations stay queued until acknowledged.
    #[must_use]
    pub fn dequeue_batch(&self, max_retry: u32, limit: usize) -> Vec<SyncOperation> {
        let tables = self.tables.read();
        let mut ops: Vec<SyncOperation> = tables
            .queue
            .values()
            .filter(|op| op.retry_count < max_retry)
            .cloned()
            .collect();
        drop(tables);
        ops.sort_by(SyncOperation::drain_order);
        ops.truncate(limit);
        ops
    }

    /// Removes a successfully uploaded operation and records the outcome on
    /// its entity.
    ///
    /// The entity becomes `Synced` only when no other operation for it is
    /// still queued. Returns the entity's resulting status, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OperationNotFound`] if the operation is gone.
    pub fn ack(
        &self,
        op_id: OpId,
        remote_updated_at: Option<Timestamp>,
    ) -> CoreResult<Option<SyncStatus>> {
        self.write(|tables, batch| {
            let op = tables
                .queue
                .get(&op_id)
                .ok_or(CoreError::OperationNotFound(op_id))?;
            batch.remove_op(op_id);
            for failed in tables.failed_for(&op.entity_type, op.entity_id) {
                batch.remove_failed_op(failed.id);
            }

            let Some(record) = tables.entity(&op.entity_type, op.entity_id) else {
                return Ok(None);
            };
            let mut record = record.clone();
            let others_queued = tables
                .ops_for(&op.entity_type, op.entity_id)
                .any(|other| other.id != op_id);

            if remote_updated_at.is_some() {
                record.remote_updated_at = remote_updated_at;
            }
            record.last_sync_attempt = Some(batch.now());
            if matches!(
                record.sync_status,
                SyncStatus::Syncing | SyncStatus::Pending
            ) {
                record.retry_count = 0;
                record.last_error = None;
                record.sync_status = if others_queued {
                    SyncStatus::Pending
                } else {
                    SyncStatus::Synced
                };
            }
            let status = record.sync_status;
            batch.put_entity(record);
            Ok(Some(status))
        })
    }

    /// Records a failed upload.
    ///
    /// Retryable failures keep the operation until it has failed
    /// `max_retry` times; non-retryable ones evict it at once. Eviction
    /// marks the owning entity `Error` and moves the operation to the failed
    /// list, where it stays until retried or superseded by a successful
    /// upload for the same entity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OperationNotFound`] if the operation is gone.
    pub fn nack(
        &self,
        op_id: OpId,
        error: &str,
        retryable: bool,
        max_retry: u32,
    ) -> CoreResult<NackOutcome> {
        self.write(|tables, batch| {
            let mut op = tables
                .queue
                .get(&op_id)
                .cloned()
                .ok_or(CoreError::OperationNotFound(op_id))?;
            op.retry_count += 1;
            op.last_error = Some(error.to_string());
            let evict = !retryable || op.retry_count >= max_retry;
            let retry_count = op.retry_count;

            if let Some(record) = tables.entity(&op.entity_type, op.entity_id) {
                let mut record = record.clone();
                record.retry_count = retry_count;
                record.last_error = Some(error.to_string());
                record.last_sync_attempt = Some(batch.now());
                if record.sync_status != SyncStatus::Conflict {
                    record.sync_status = if evict {
                        SyncStatus::Error
                    } else {
                        SyncStatus::Pending
                    };
                }
                batch.put_entity(record);
            }

            if evict {
                warn!(
                    op = %op_id,
                    entity_type = %op.entity_type,
                    entity_id = %op.entity_id,
                    kind = %op.kind,
                    retry_count,
                    error,
                    "evicted operation from sync queue"
                );
                batch.remove_op(op_id);
                batch.put_failed_op(op);
                Ok(NackOutcome::Evicted { retry_count })
            } else {
                batch.put_op(op);
                Ok(NackOutcome::Retained { retry_count })
            }
        })
    }

    /// Returns an in-flight operation to the queue without counting a
    /// failure. The entity goes back to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OperationNotFound`] if the operation is gone.
    pub fn release(&self, op_id: OpId) -> CoreResult<()> {
        self.write(|tables, batch| {
            let op = tables
                .queue
                .get(&op_id)
                .ok_or(CoreError::OperationNotFound(op_id))?;
            if let Some(record) = tables.entity(&op.entity_type, op.entity_id) {
                if record.sync_status == SyncStatus::Syncing {
                    let mut record = record.clone();
                    record.sync_status = SyncStatus::Pending;
                    batch.put_entity(record);
                }
            }
            Ok(())
        })
    }

    /// Drops every queued operation for one entity. Returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn discard_for_entity(&self, entity_type: &EntityType, id: EntityId) -> CoreResult<usize> {
        self.write(|tables, batch| {
            Ok(crate::entity::stage_discard_ops(tables, batch, entity_type, id))
        })
    }

    /// Queued operations for one entity, in queue order.
    #[must_use]
    pub fn ops_for_entity(&self, entity_type: &EntityType, id: EntityId) -> Vec<SyncOperation> {
        self.tables
            .read()
            .ops_for(entity_type, id)
            .cloned()
            .collect()
    }

    /// Returns true if a delete for the entity is waiting for upload.
    #[must_use]
    pub fn has_pending_delete(&self, entity_type: &EntityType, id: EntityId) -> bool {
        self.tables
            .read()
            .ops_for(entity_type, id)
            .any(|op| op.kind == OperationKind::Delete)
    }

    /// Number of queued operations.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.tables.read().queue.len()
    }

    /// Every queued operation in drain order.
    #[must_use]
    pub fn queued_ops(&self) -> Vec<SyncOperation> {
        self.dequeue_batch(u32::MAX, usize::MAX)
    }

    /// Operations evicted from the queue, oldest first, each carrying its
    /// last error and retry count.
    #[must_use]
    pub fn failed_ops(&self) -> Vec<SyncOperation> {
        self.tables.read().failed.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;
    use fieldsync_protocol::ManualClock;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn forms() -> EntityType {
        EntityType::from("forms")
    }

    #[test]
    fn low_high_normal_drain_as_high_normal_low() {
        let store = LocalStore::open_in_memory().unwrap();
        for priority in [Priority::Low, Priority::High, Priority::Normal] {
            store
                .put(&forms(), EntityId::new(), Payload::new(), priority)
                .unwrap();
        }
        let drained: Vec<Priority> = store
            .dequeue_batch(3, 10)
            .into_iter()
            .map(|op| op.priority)
            .collect();
        assert_eq!(drained, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn batch_limit_applies_after_ordering() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&forms(), EntityId::new(), Payload::new(), Priority::Low).unwrap();
        store.put(&forms(), EntityId::new(), Payload::new(), Priority::Critical).unwrap();

        let batch = store.dequeue_batch(3, 1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].priority, Priority::Critical);
    }

    #[test]
    fn ack_marks_synced_when_last_op() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        let ops = store.dequeue_batch(3, 10);

        assert_eq!(store.ack(ops[0].id, Some(10)).unwrap(), Some(SyncStatus::Pending));
        assert_eq!(store.ack(ops[1].id, Some(11)).unwrap(), Some(SyncStatus::Synced));
        assert_eq!(store.queue_len(), 0);
        assert_eq!(store.get(&forms(), id).unwrap().remote_updated_at, Some(11));
    }

    #[test]
    fn three_retryable_failures_evict() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        let op_id = store.dequeue_batch(3, 1)[0].id;

        assert_eq!(
            store.nack(op_id, "timeout", true, 3).unwrap(),
            NackOutcome::Retained { retry_count: 1 }
        );
        assert_eq!(store.get(&forms(), id).unwrap().sync_status, SyncStatus::Pending);
        store.nack(op_id, "timeout", true, 3).unwrap();
        let outcome = store.nack(op_id, "timeout", true, 3).unwrap();

        assert!(outcome.is_evicted());
        assert_eq!(store.queue_len(), 0);
        let record = store.get(&forms(), id).unwrap();
        assert_eq!(record.sync_status, SyncStatus::Error);
        assert_eq!(record.retry_count, 3);
        assert_eq!(record.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn non_retryable_failure_evicts_immediately() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        let op_id = store.dequeue_batch(3, 1)[0].id;

        assert!(store.nack(op_id, "invalid field", false, 3).unwrap().is_evicted());
        assert_eq!(store.get(&forms(), id).unwrap().sync_status, SyncStatus::Error);
    }

    #[test]
    fn release_does_not_count_failure() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        store.set_status(&forms(), id, SyncStatus::Syncing).unwrap();
        let op_id = store.dequeue_batch(3, 1)[0].id;

        store.release(op_id).unwrap();
        assert_eq!(store.dequeue_batch(3, 1)[0].retry_count, 0);
        assert_eq!(store.get(&forms(), id).unwrap().sync_status, SyncStatus::Pending);
    }

    #[test]
    fn reset_failed_requeues() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        let op_id = store.dequeue_batch(3, 1)[0].id;
        store.nack(op_id, "rejected", false, 3).unwrap();

        assert_eq!(store.reset_failed(Priority::Normal).unwrap(), 1);
        let record = store.get(&forms(), id).unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(store.ops_for_entity(&forms(), id).len(), 1);
    }

    #[test]
    fn evicted_delete_of_missing_entity_stays_visible() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        let create = store.dequeue_batch(3, 1)[0].id;
        store.ack(create, Some(5)).unwrap();
        store.delete(&forms(), id, Priority::Normal).unwrap();
        let delete = store.dequeue_batch(3, 1)[0].id;

        for _ in 0..3 {
            store.nack(delete, "server unavailable", true, 3).unwrap();
        }

        assert_eq!(store.queue_len(), 0);
        assert!(store.get(&forms(), id).is_none());
        let failed = store.failed_ops();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, OperationKind::Delete);
        assert_eq!(failed[0].retry_count, 3);
        assert_eq!(failed[0].last_error.as_deref(), Some("server unavailable"));

        assert_eq!(store.reset_failed(Priority::High).unwrap(), 1);
        assert!(store.failed_ops().is_empty());
        let requeued = store.ops_for_entity(&forms(), id);
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].kind, OperationKind::Delete);
        assert_eq!(requeued[0].priority, Priority::High);
    }

    #[test]
    fn successful_upload_clears_failed_entry() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        let first = store.dequeue_batch(3, 1)[0].id;
        store.nack(first, "rejected", false, 3).unwrap();
        assert_eq!(store.failed_ops().len(), 1);

        store.put(&forms(), id, Payload::new(), Priority::Normal).unwrap();
        let second = store.dequeue_batch(3, 1)[0].id;
        store.ack(second, Some(9)).unwrap();

        assert!(store.failed_ops().is_empty());
    }

    #[test]
    fn unknown_op_is_an_error() {
        let store = LocalStore::open_in_memory().unwrap();
        assert!(matches!(
            store.ack(OpId(404), None),
            Err(CoreError::OperationNotFound(_))
        ));
    }

    fn any_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Critical),
        ]
    }

    proptest! {
        #[test]
        fn dequeue_never_inverts_priority(priorities in prop::collection::vec(any_priority(), 1..20)) {
            let config = StoreConfig::default().with_clock(Arc::new(ManualClock::new(0)));
            let store = LocalStore::open_in_memory_with(config).unwrap();
            for p in &priorities {
                store.put(&forms(), EntityId::new(), Payload::new(), *p).unwrap();
            }
            let drained = store.dequeue_batch(3, usize::MAX);
            prop_assert_eq!(drained.len(), priorities.len());
            for pair in drained.windows(2) {
                prop_assert!(pair[0].priority >= pair[1].priority);
                if pair[0].priority == pair[1].priority {
                    prop_assert!(pair[0].id < pair[1].id);
                }
            }
        }
    }
}
