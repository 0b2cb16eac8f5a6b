//! Remote adapter abstraction.
//!
//! The engine talks to exactly one [`RemoteAdapter`], its only I/O
//! boundary. [`TableRemote`] adapts any table-oriented [`TableBackend`]
//! to that contract; [`OfflineRemote`] stands in when no remote exists.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use fieldsync_protocol::{EntityId, EntityType, Filter, Payload, RemoteRecord, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The engine's view of the remote store.
///
/// Every call either returns the record as the remote now holds it,
/// including its server-assigned `updated_at`, or a typed [`RemoteError`].
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Creates a record. Creating an id that already exists replaces it.
    async fn create(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord>;

    /// Replaces a record's data.
    async fn update(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord>;

    /// Deletes a record, returning its tombstone.
    async fn delete(&self, entity_type: &EntityType, id: EntityId) -> RemoteResult<RemoteRecord>;

    /// Records, tombstones included, changed after `cursor`, oldest first.
    async fn query_changed_since(
        &self,
        entity_type: &EntityType,
        cursor: Option<Timestamp>,
    ) -> RemoteResult<Vec<RemoteRecord>>;
}

#[async_trait]
impl<T: RemoteAdapter + ?Sized> RemoteAdapter for Arc<T> {
    async fn create(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        (**self).create(entity_type, id, payload).await
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        (**self).update(entity_type, id, payload).await
    }

    async fn delete(&self, entity_type: &EntityType, id: EntityId) -> RemoteResult<RemoteRecord> {
        (**self).delete(entity_type, id).await
    }

    async fn query_changed_since(
        &self,
        entity_type: &EntityType,
        cursor: Option<Timestamp>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        (**self).query_changed_since(entity_type, cursor).await
    }
}

/// A table-oriented remote store.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Inserts or replaces a row.
    async fn insert(&self, table: &str, id: EntityId, payload: &Payload)
        -> RemoteResult<RemoteRecord>;

    /// Replaces a row's data.
    async fn update(&self, table: &str, id: EntityId, payload: &Payload)
        -> RemoteResult<RemoteRecord>;

    /// Deletes a row.
    async fn delete(&self, table: &str, id: EntityId) -> RemoteResult<RemoteRecord>;

    /// Live rows whose fields equal `filter`.
    async fn select_where(&self, table: &str, filter: &Filter) -> RemoteResult<Vec<RemoteRecord>>;

    /// Rows changed after `cursor`.
    async fn select_changed_since(
        &self,
        table: &str,
        cursor: Option<Timestamp>,
    ) -> RemoteResult<Vec<RemoteRecord>>;
}

/// Adapts a [`TableBackend`] to the engine's [`RemoteAdapter`] contract.
///
/// Entity types map to tables of the same name unless overridden.
#[derive(Debug)]
pub struct TableRemote<B> {
    backend: B,
    tables: BTreeMap<EntityType, String>,
}

impl<B: TableBackend> TableRemote<B> {
    /// Creates an adapter over `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            tables: BTreeMap::new(),
        }
    }

    /// Stores `entity_type` in `table`.
    pub fn with_table(
        mut self,
        entity_type: impl Into<EntityType>,
        table: impl Into<String>,
    ) -> Self {
        self.tables.insert(entity_type.into(), table.into());
        self
    }

    /// Table backing `entity_type`.
    pub fn table_for<'a>(&'a self, entity_type: &'a EntityType) -> &'a str {
        self.tables
            .get(entity_type)
            .map_or(entity_type.as_str(), String::as_str)
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Live records of `entity_type` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn find_where(
        &self,
        entity_type: &EntityType,
        filter: &Filter,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        self.backend
            .select_where(self.table_for(entity_type), filter)
            .await
    }
}

#[async_trait]
impl<B: TableBackend> RemoteAdapter for TableRemote<B> {
    async fn create(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        self.backend
            .insert(self.table_for(entity_type), id, payload)
            .await
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        self.backend
            .update(self.table_for(entity_type), id, payload)
            .await
    }

    async fn delete(&self, entity_type: &EntityType, id: EntityId) -> RemoteResult<RemoteRecord> {
        self.backend.delete(self.table_for(entity_type), id).await
    }

    async fn query_changed_since(
        &self,
        entity_type: &EntityType,
        cursor: Option<Timestamp>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        let mut records = self
            .backend
            .select_changed_since(self.table_for(entity_type), cursor)
            .await?;
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }
}

/// A remote that is never configured. Runs complete locally and every
/// queued operation stays queued.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

impl OfflineRemote {
    fn refuse<T>() -> RemoteResult<T> {
        Err(RemoteError::not_configured("no remote store configured"))
    }
}

#[async_trait]
impl RemoteAdapter for OfflineRemote {
    async fn create(&self, _: &EntityType, _: EntityId, _: &Payload) -> RemoteResult<RemoteRecord> {
        Self::refuse()
    }

    async fn update(&self, _: &EntityType, _: EntityId, _: &Payload) -> RemoteResult<RemoteRecord> {
        Self::refuse()
    }

    async fn delete(&self, _: &EntityType, _: EntityId) -> RemoteResult<RemoteRecord> {
        Self::refuse()
    }

    async fn query_changed_since(
        &self,
        _: &EntityType,
        _: Option<Timestamp>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        Self::refuse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        tables: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TableBackend for RecordingBackend {
        async fn insert(
            &self,
            table: &str,
            id: EntityId,
            payload: &Payload,
        ) -> RemoteResult<RemoteRecord> {
            self.tables.lock().push(table.to_string());
            Ok(RemoteRecord {
                id,
                payload: payload.clone(),
                updated_at: 1,
                deleted: false,
            })
        }

        async fn update(
            &self,
            table: &str,
            id: EntityId,
            payload: &Payload,
        ) -> RemoteResult<RemoteRecord> {
            self.insert(table, id, payload).await
        }

        async fn delete(&self, table: &str, id: EntityId) -> RemoteResult<RemoteRecord> {
            self.tables.lock().push(table.to_string());
            Err(RemoteError::rejected(format!("cannot delete {id}")))
        }

        async fn select_where(&self, _: &str, _: &Filter) -> RemoteResult<Vec<RemoteRecord>> {
            Ok(Vec::new())
        }

        async fn select_changed_since(
            &self,
            table: &str,
            _: Option<Timestamp>,
        ) -> RemoteResult<Vec<RemoteRecord>> {
            self.tables.lock().push(table.to_string());
            let record = |updated_at| RemoteRecord {
                id: EntityId::new(),
                payload: Payload::new(),
                updated_at,
                deleted: false,
            };
            Ok(vec![record(5), record(2), record(9)])
        }
    }

    #[tokio::test]
    async fn table_mapping() {
        let remote = TableRemote::new(RecordingBackend::default())
            .with_table("inspections", "field_inspections");
        let inspections = EntityType::from("inspections");
        let assets = EntityType::from("assets");

        remote.create(&inspections, EntityId::new(), &Payload::new()).await.unwrap();
        remote.create(&assets, EntityId::new(), &Payload::new()).await.unwrap();

        assert_eq!(
            *remote.backend().tables.lock(),
            vec!["field_inspections".to_string(), "assets".to_string()]
        );
    }

    #[tokio::test]
    async fn changes_come_back_oldest_first() {
        let remote = TableRemote::new(RecordingBackend::default());
        let records = remote
            .query_changed_since(&EntityType::from("assets"), None)
            .await
            .unwrap();
        let stamps: Vec<_> = records.iter().map(|r| r.updated_at).collect();
        assert_eq!(stamps, vec![2, 5, 9]);
    }

    #[tokio::test]
    async fn backend_errors_pass_through() {
        let remote = TableRemote::new(RecordingBackend::default());
        let err = remote
            .delete(&EntityType::from("assets"), EntityId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
    }

    #[tokio::test]
    async fn offline_remote_is_not_configured() {
        let remote = OfflineRemote;
        let err = remote
            .query_changed_since(&EntityType::from("assets"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_configured());
        assert!(!err.is_retryable());
    }
}
