//! Conflict case storage and resolution.

use crate::entity::{stage_discard_ops, stage_forced_write};
use crate::error::{CoreError, CoreResult};
use crate::store::LocalStore;
use fieldsync_protocol::{
    ConflictCase, ConflictId, ConflictSide, EntityId, EntityType, Priority, RemoteRecord,
    SyncStatus, Timestamp,
};
use std::collections::BTreeSet;
use tracing::info;

impl LocalStore {
    /// Opens a conflict case for an entity and moves it to `Conflict`.
    ///
    /// If the entity already has an open case, that case is refreshed with
    /// the new remote version instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing or the commit fails.
    pub fn open_conflict(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        remote: &RemoteRecord,
        conflict_fields: BTreeSet<String>,
    ) -> CoreResult<ConflictCase> {
        self.write(|tables, batch| {
            let mut record = tables
                .entity(entity_type, id)
                .cloned()
                .ok_or_else(|| CoreError::entity_not_found(entity_type, id))?;

            let case = match tables.open_conflict_for(entity_type, id) {
                Some(existing) => {
                    let mut case = existing.clone();
                    case.remote_data = remote.payload.clone();
                    case.remote_modified = remote.updated_at;
                    case.remote_deleted = remote.deleted;
                    case.conflict_fields = conflict_fields;
                    case
                }
                None => ConflictCase {
                    id: ConflictId::new(),
                    entity_type: entity_type.clone(),
                    entity_id: id,
                    local_data: record.payload.clone(),
                    remote_data: remote.payload.clone(),
                    local_modified: record.last_modified,
                    remote_modified: remote.updated_at,
                    remote_deleted: remote.deleted,
                    conflict_fields,
                    detected_at: batch.now(),
                    resolved: false,
                    resolution: None,
                    resolved_at: None,
                },
            };

            record.sync_status = record.sync_status.transition(SyncStatus::Conflict)?;
            batch.put_entity(record);
            batch.put_conflict(case.clone());
            Ok(case)
        })
    }

    /// Updates the remote side of an open case.
    ///
    /// # Errors
    ///
    /// Returns an error if the case is missing, already resolved, or the
    /// commit fails.
    pub fn refresh_conflict(
        &self,
        id: ConflictId,
        remote: &RemoteRecord,
        conflict_fields: BTreeSet<String>,
    ) -> CoreResult<ConflictCase> {
        self.write(|tables, batch| {
            let mut case = open_case(tables, id)?;
            case.remote_data = remote.payload.clone();
            case.remote_modified = remote.updated_at;
            case.remote_deleted = remote.deleted;
            case.conflict_fields = conflict_fields;
            batch.put_conflict(case.clone());
            Ok(case)
        })
    }

    /// Applies the chosen side of a case.
    ///
    /// Queued operations for the entity are discarded, since they carry the
    /// local intent the decision replaces. The chosen payload is written as a
    /// pending change with a fresh upload, except when the remote side is a
    /// deletion and wins, in which case the local record is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the case is missing or already resolved.
    pub fn resolve_conflict(
        &self,
        id: ConflictId,
        side: ConflictSide,
        priority: Priority,
    ) -> CoreResult<ConflictCase> {
        self.write(|tables, batch| {
            let mut case = open_case(tables, id)?;
            let (entity_type, entity_id) = (case.entity_type.clone(), case.entity_id);

            let discarded = stage_discard_ops(tables, batch, &entity_type, entity_id);
            if side == ConflictSide::Remote && case.remote_deleted {
                batch.remove_entity(&entity_type, entity_id);
            } else {
                let payload = case.payload_for(side).clone();
                stage_forced_write(tables, batch, &entity_type, entity_id, payload, priority);
            }

            case.resolve(side, batch.now());
            batch.put_conflict(case.clone());
            info!(
                conflict = %id,
                %entity_type,
                %entity_id,
                %side,
                discarded,
                "resolved conflict"
            );
            Ok(case)
        })
    }

    /// Closes a case whose two sides turned out to agree. The entity is
    /// marked `Synced` against the remote version and its held operations
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the case is missing or already resolved.
    pub fn settle_conflict(
        &self,
        id: ConflictId,
        remote_updated_at: Timestamp,
    ) -> CoreResult<ConflictCase> {
        self.write(|tables, batch| {
            let mut case = open_case(tables, id)?;
            stage_discard_ops(tables, batch, &case.entity_type, case.entity_id);
            if let Some(record) = tables.entity(&case.entity_type, case.entity_id) {
                let mut record = record.clone();
                record.sync_status = SyncStatus::Synced;
                record.remote_updated_at = Some(remote_updated_at);
                record.retry_count = 0;
                record.last_error = None;
                batch.put_entity(record);
            }
            case.resolve(ConflictSide::Remote, batch.now());
            batch.put_conflict(case.clone());
            Ok(case)
        })
    }

    /// Returns a conflict case.
    #[must_use]
    pub fn conflict(&self, id: ConflictId) -> Option<ConflictCase> {
        self.tables.read().conflicts.get(&id).cloned()
    }

    /// Every stored case, resolved ones included, oldest first.
    #[must_use]
    pub fn conflicts(&self) -> Vec<ConflictCase> {
        let mut cases: Vec<ConflictCase> = self.tables.read().conflicts.values().cloned().collect();
        cases.sort_by_key(|c| c.detected_at);
        cases
    }

    /// Unresolved cases, oldest first.
    #[must_use]
    pub fn open_conflicts(&self) -> Vec<ConflictCase> {
        let mut cases: Vec<ConflictCase> = self
            .tables
            .read()
            .conflicts
            .values()
            .filter(|c| !c.resolved)
            .cloned()
            .collect();
        cases.sort_by_key(|c| c.detected_at);
        cases
    }

    /// The open case for an entity, if any.
    #[must_use]
    pub fn conflict_for_entity(
        &self,
        entity_type: &EntityType,
        id: EntityId,
    ) -> Option<ConflictCase> {
        self.tables.read().open_conflict_for(entity_type, id).cloned()
    }

    /// Deletes resolved cases resolved before `before`. Returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn prune_resolved_conflicts(&self, before: Timestamp) -> CoreResult<usize> {
        self.write(|tables, batch| {
            let stale: Vec<ConflictId> = tables
                .conflicts
                .values()
                .filter(|c| c.resolved && c.resolved_at.is_some_and(|at| at < before))
                .map(|c| c.id)
                .collect();
            for id in &stale {
                batch.remove_conflict(*id);
            }
            Ok(stale.len())
        })
    }
}

fn open_case(tables: &crate::tables::Tables, id: ConflictId) -> CoreResult<ConflictCase> {
    let case = tables
        .conflicts
        .get(&id)
        .ok_or(CoreError::ConflictNotFound(id))?;
    if case.resolved {
        return Err(CoreError::ConflictResolved(id));
    }
    Ok(case.clone())
}
