//! In-memory tables rebuilt from the journal.

use crate::journal::Mutation;
use fieldsync_protocol::{
    ConflictCase, ConflictId, EntityId, EntityRecord, EntityType, OpId, SyncOperation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current store state: one table per entity type, the operation queue,
/// metadata and conflict cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) entities: BTreeMap<EntityType, BTreeMap<EntityId, EntityRecord>>,
    pub(crate) queue: BTreeMap<OpId, SyncOperation>,
    pub(crate) metadata: BTreeMap<String, String>,
    pub(crate) conflicts: BTreeMap<ConflictId, ConflictCase>,
    #[serde(default)]
    pub(crate) failed: BTreeMap<OpId, SyncOperation>,
    pub(crate) next_op: u64,
}

impl Tables {
    /// Applies one mutation.
    pub(crate) fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::PutEntity(record) => {
                self.entities
                    .entry(record.entity_type.clone())
                    .or_default()
                    .insert(record.id, record);
            }
            Mutation::RemoveEntity { entity_type, id } => {
                if let Some(table) = self.entities.get_mut(&entity_type) {
                    table.remove(&id);
                }
            }
            Mutation::PutOp(op) => {
                self.next_op = self.next_op.max(op.id.0 + 1);
                self.queue.insert(op.id, op);
            }
            Mutation::RemoveOp(id) => {
                self.queue.remove(&id);
            }
            Mutation::SetMeta { key, value } => {
                self.metadata.insert(key, value);
            }
            Mutation::PutConflict(case) => {
                self.conflicts.insert(case.id, case);
            }
            Mutation::RemoveConflict(id) => {
                self.conflicts.remove(&id);
            }
            Mutation::PutFailedOp(op) => {
                self.next_op = self.next_op.max(op.id.0 + 1);
                self.failed.insert(op.id, op);
            }
            Mutation::RemoveFailedOp(id) => {
                self.failed.remove(&id);
            }
        }
    }

    pub(crate) fn entity(&self, entity_type: &EntityType, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(entity_type).and_then(|t| t.get(&id))
    }

    pub(crate) fn all_entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values().flat_map(BTreeMap::values)
    }

    pub(crate) fn ops_for(
        &self,
        entity_type: &EntityType,
        id: EntityId,
    ) -> impl Iterator<Item = &SyncOperation> {
        let entity_type = entity_type.clone();
        self.queue
            .values()
            .filter(move |op| op.entity_id == id && op.entity_type == entity_type)
    }

    pub(crate) fn failed_for(
        &self,
        entity_type: &EntityType,
        id: EntityId,
    ) -> impl Iterator<Item = &SyncOperation> {
        let entity_type = entity_type.clone();
        self.failed
            .values()
            .filter(move |op| op.entity_id == id && op.entity_type == entity_type)
    }

    pub(crate) fn open_conflict_for(
        &self,
        entity_type: &EntityType,
        id: EntityId,
    ) -> Option<&ConflictCase> {
        self.conflicts
            .values()
            .find(|c| !c.resolved && c.entity_id == id && &c.entity_type == entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::{OperationKind, Payload, Priority};

    fn op(id: u64, entity_id: EntityId) -> SyncOperation {
        SyncOperation {
            id: OpId(id),
            kind: OperationKind::Create,
            entity_type: "forms".into(),
            entity_id,
            payload: None,
            priority: Priority::Normal,
            timestamp: 0,
            retry_count: 0,
            last_error: None,
        }
    }

    #[test]
    fn put_op_advances_sequence() {
        let mut tables = Tables::default();
        tables.apply(Mutation::PutOp(op(41, EntityId::new())));
        assert_eq!(tables.next_op, 42);
        tables.apply(Mutation::PutOp(op(3, EntityId::new())));
        assert_eq!(tables.next_op, 42);
    }

    #[test]
    fn entity_put_and_remove() {
        let mut tables = Tables::default();
        let id = EntityId::new();
        let ty = EntityType::from("forms");
        tables.apply(Mutation::PutEntity(EntityRecord::new_local(
            ty.clone(),
            id,
            Payload::new(),
            1,
        )));
        assert!(tables.entity(&ty, id).is_some());

        tables.apply(Mutation::RemoveEntity {
            entity_type: ty.clone(),
            id,
        });
        assert!(tables.entity(&ty, id).is_none());
    }

    #[test]
    fn ops_for_filters_by_entity() {
        let mut tables = Tables::default();
        let target = EntityId::new();
        tables.apply(Mutation::PutOp(op(1, target)));
        tables.apply(Mutation::PutOp(op(2, EntityId::new())));
        tables.apply(Mutation::PutOp(op(3, target)));
        let ids: Vec<OpId> = tables.ops_for(&"forms".into(), target).map(|o| o.id).collect();
        assert_eq!(ids, vec![OpId(1), OpId(3)]);
    }
}
