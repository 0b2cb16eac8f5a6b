//! Journal records and write batches.
//!
//! Every commit is a single CBOR frame holding one [`JournalRecord`]. A
//! record is either a batch of mutations applied together or a snapshot
//! written by compaction. A large snapshot holds only metadata and is
//! followed by batches that re-insert the rows.

use crate::tables::Tables;
use fieldsync_protocol::{
    ConflictCase, ConflictId, EntityId, EntityRecord, EntityType, OpId, OperationKind, Payload,
    Priority, SyncOperation, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Journal format version written into every record.
pub const JOURNAL_FORMAT: u16 = 1;

/// A single change to the store tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Insert or replace an entity.
    PutEntity(EntityRecord),
    /// Remove an entity.
    RemoveEntity {
        /// Entity type.
        entity_type: EntityType,
        /// Entity id.
        id: EntityId,
    },
    /// Insert or replace a queued operation.
    PutOp(SyncOperation),
    /// Remove a queued operation.
    RemoveOp(OpId),
    /// Set a metadata value.
    SetMeta {
        /// Key.
        key: String,
        /// Value.
        value: String,
    },
    /// Insert or replace a conflict case.
    PutConflict(ConflictCase),
    /// Remove a conflict case.
    RemoveConflict(ConflictId),
    /// Record an operation dropped from the queue after it failed.
    PutFailedOp(SyncOperation),
    /// Forget a failed operation.
    RemoveFailedOp(OpId),
}

/// One journal frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// Mutations committed together.
    Batch {
        /// Format version.
        format: u16,
        /// Mutations in application order.
        mutations: Vec<Mutation>,
    },
    /// Complete table state, replacing everything before it.
    Snapshot {
        /// Format version.
        format: u16,
        /// Table contents.
        tables: Tables,
    },
}

impl JournalRecord {
    /// Format version of the record.
    #[must_use]
    pub fn format(&self) -> u16 {
        match self {
            Self::Batch { format, .. } | Self::Snapshot { format, .. } => *format,
        }
    }
}

/// Mutations collected by one write closure.
///
/// A batch sees the tables as they were when the write started; its own
/// mutations become visible only after commit.
#[derive(Debug)]
pub struct Batch {
    now: Timestamp,
    next_op: u64,
    mutations: Vec<Mutation>,
}

impl Batch {
    pub(crate) fn new(now: Timestamp, next_op: u64) -> Self {
        Self {
            now,
            next_op,
            mutations: Vec::new(),
        }
    }

    /// Time stamped onto records written in this batch.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub(crate) fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    /// Writes an entity record.
    pub fn put_entity(&mut self, record: EntityRecord) {
        self.mutations.push(Mutation::PutEntity(record));
    }

    /// Removes an entity record.
    pub fn remove_entity(&mut self, entity_type: &EntityType, id: EntityId) {
        self.mutations.push(Mutation::RemoveEntity {
            entity_type: entity_type.clone(),
            id,
        });
    }

    /// Queues a new operation and returns its id.
    pub fn enqueue(
        &mut self,
        kind: OperationKind,
        entity_type: &EntityType,
        entity_id: EntityId,
        payload: Option<Payload>,
        priority: Priority,
    ) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        self.mutations.push(Mutation::PutOp(SyncOperation {
            id,
            kind,
            entity_type: entity_type.clone(),
            entity_id,
            payload,
            priority,
            timestamp: self.now,
            retry_count: 0,
            last_error: None,
        }));
        id
    }

    /// Replaces a queued operation.
    pub fn put_op(&mut self, op: SyncOperation) {
        self.mutations.push(Mutation::PutOp(op));
    }

    /// Removes a queued operation.
    pub fn remove_op(&mut self, id: OpId) {
        self.mutations.push(Mutation::RemoveOp(id));
    }

    /// Sets a metadata value.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.mutations.push(Mutation::SetMeta {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Writes a conflict case.
    pub fn put_conflict(&mut self, case: ConflictCase) {
        self.mutations.push(Mutation::PutConflict(case));
    }

    /// Removes a conflict case.
    pub fn remove_conflict(&mut self, id: ConflictId) {
        self.mutations.push(Mutation::RemoveConflict(id));
    }

    /// Records an evicted operation.
    pub fn put_failed_op(&mut self, op: SyncOperation) {
        self.mutations.push(Mutation::PutFailedOp(op));
    }

    /// Forgets an evicted operation.
    pub fn remove_failed_op(&mut self, id: OpId) {
        self.mutations.push(Mutation::RemoveFailedOp(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::{from_cbor, to_cbor};

    #[test]
    fn enqueue_allocates_sequential_ids() {
        let mut batch = Batch::new(100, 7);
        let ty = EntityType::from("forms");
        let a = batch.enqueue(OperationKind::Create, &ty, EntityId::new(), None, Priority::Low);
        let b = batch.enqueue(OperationKind::Delete, &ty, EntityId::new(), None, Priority::High);
        assert_eq!(a, OpId(7));
        assert_eq!(b, OpId(8));

        let mutations = batch.into_mutations();
        match &mutations[0] {
            Mutation::PutOp(op) => assert_eq!(op.timestamp, 100),
            other => panic!("unexpected mutation: {other:?}"),
        }
    }

    #[test]
    fn record_encodes_as_cbor() {
        let record = JournalRecord::Batch {
            format: JOURNAL_FORMAT,
            mutations: vec![Mutation::SetMeta {
                key: "k".into(),
                value: "v".into(),
            }],
        };
        let decoded: JournalRecord = from_cbor(&to_cbor(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.format(), JOURNAL_FORMAT);
    }
}
