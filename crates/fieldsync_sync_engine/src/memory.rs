//! In-memory remote with scripted faults, for tests and demos.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::RemoteAdapter;
use async_trait::async_trait;
use fieldsync_protocol::{
    Clock, EntityId, EntityType, Payload, RemoteRecord, SystemClock, Timestamp,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// A failure to inject into the next remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Transient network failure.
    Network,
    /// Permanent rejection.
    Rejected,
    /// Remote not configured.
    NotConfigured,
}

impl Fault {
    fn into_error(self, call: &str) -> RemoteError {
        match self {
            Fault::Network => RemoteError::network(format!("{call}: connection reset")),
            Fault::Rejected => RemoteError::rejected(format!("{call}: rejected")),
            Fault::NotConfigured => RemoteError::not_configured(format!("{call}: no table")),
        }
    }
}

/// Number of calls seen per method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `create` calls.
    pub creates: usize,
    /// `update` calls.
    pub updates: usize,
    /// `delete` calls.
    pub deletes: usize,
    /// `query_changed_since` calls.
    pub queries: usize,
}

#[derive(Default)]
struct State {
    tables: HashMap<EntityType, BTreeMap<EntityId, RemoteRecord>>,
    last_stamp: Timestamp,
    online: bool,
    not_configured: bool,
    scripted: VecDeque<Fault>,
    rejected_ids: HashSet<EntityId>,
    calls: CallCounts,
}

impl State {
    fn stamp(&mut self, now: Timestamp) -> Timestamp {
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }

    fn check(&mut self, call: &str) -> RemoteResult<()> {
        if !self.online {
            return Err(RemoteError::network(format!("{call}: remote unreachable")));
        }
        if self.not_configured {
            return Err(RemoteError::not_configured(format!("{call}: no table")));
        }
        if let Some(fault) = self.scripted.pop_front() {
            return Err(fault.into_error(call));
        }
        Ok(())
    }

    fn put(&mut self, entity_type: &EntityType, record: RemoteRecord) -> RemoteRecord {
        self.tables
            .entry(entity_type.clone())
            .or_default()
            .insert(record.id, record.clone());
        record
    }
}

/// A remote store held in memory.
///
/// Stamps `updated_at` from its clock, strictly increasing. Faults are
/// injected with [`MemoryRemote::set_online`], [`MemoryRemote::fail_next`]
/// and [`MemoryRemote::reject`].
pub struct MemoryRemote {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl MemoryRemote {
    /// Creates an online remote stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an online remote stamped by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State {
                online: true,
                ..State::default()
            }),
        }
    }

    /// Makes every call fail with a network error while offline.
    pub fn set_online(&self, online: bool) {
        self.state.lock().online = online;
    }

    /// Makes every call answer not-configured.
    pub fn set_not_configured(&self, not_configured: bool) {
        self.state.lock().not_configured = not_configured;
    }

    /// Fails the next call with `fault`. Faults queue up in order.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().scripted.push_back(fault);
    }

    /// Rejects every write to `id`.
    pub fn reject(&self, id: EntityId) {
        self.state.lock().rejected_ids.insert(id);
    }

    /// Drops scripted faults and rejections.
    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.scripted.clear();
        state.rejected_ids.clear();
    }

    /// Writes a record as another device would, stamped `at` or later.
    pub fn write_remote(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: Payload,
        at: Timestamp,
    ) -> RemoteRecord {
        let mut state = self.state.lock();
        let updated_at = state.stamp(at);
        state.put(
            entity_type,
            RemoteRecord {
                id,
                payload,
                updated_at,
                deleted: false,
            },
        )
    }

    /// Deletes a record as another device would.
    pub fn delete_remote(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        at: Timestamp,
    ) -> RemoteRecord {
        let mut state = self.state.lock();
        let updated_at = state.stamp(at);
        state.put(
            entity_type,
            RemoteRecord {
                id,
                payload: Payload::new(),
                updated_at,
                deleted: true,
            },
        )
    }

    /// Returns a record, tombstones included.
    pub fn get(&self, entity_type: &EntityType, id: EntityId) -> Option<RemoteRecord> {
        self.state
            .lock()
            .tables
            .get(entity_type)
            .and_then(|t| t.get(&id))
            .cloned()
    }

    /// Live records of a type.
    pub fn records(&self, entity_type: &EntityType) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .tables
            .get(entity_type)
            .map(|t| t.values().filter(|r| !r.deleted).cloned().collect())
            .unwrap_or_default()
    }

    /// Calls seen so far.
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    fn write(
        &self,
        call: &str,
        entity_type: &EntityType,
        id: EntityId,
        payload: Option<&Payload>,
    ) -> RemoteResult<RemoteRecord> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.check(call)?;
        if state.rejected_ids.contains(&id) {
            return Err(RemoteError::rejected(format!("{call}: {id} refused")));
        }
        let updated_at = state.stamp(now);
        let record = RemoteRecord {
            id,
            payload: payload.cloned().unwrap_or_default(),
            updated_at,
            deleted: payload.is_none(),
        };
        Ok(state.put(entity_type, record))
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryRemote")
            .field("tables", &state.tables.len())
            .field("online", &state.online)
            .field("calls", &state.calls)
            .finish()
    }
}

#[async_trait]
impl RemoteAdapter for MemoryRemote {
    async fn create(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        self.state.lock().calls.creates += 1;
        self.write("create", entity_type, id, Some(payload))
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        self.state.lock().calls.updates += 1;
        self.write("update", entity_type, id, Some(payload))
    }

    async fn delete(&self, entity_type: &EntityType, id: EntityId) -> RemoteResult<RemoteRecord> {
        self.state.lock().calls.deletes += 1;
        self.write("delete", entity_type, id, None)
    }

    async fn query_changed_since(
        &self,
        entity_type: &EntityType,
        cursor: Option<Timestamp>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        let mut state = self.state.lock();
        state.calls.queries += 1;
        state.check("query")?;
        let mut records: Vec<RemoteRecord> = state
            .tables
            .get(entity_type)
            .map(|t| {
                t.values()
                    .filter(|r| cursor.map_or(true, |c| r.updated_at > c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::ManualClock;

    fn remote() -> MemoryRemote {
        MemoryRemote::with_clock(Arc::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn create_is_upsert() {
        let remote = remote();
        let ty = EntityType::from("assets");
        let id = EntityId::new();

        let first = remote.create(&ty, id, &Payload::new()).await.unwrap();
        let second = remote.create(&ty, id, &Payload::new()).await.unwrap();

        assert!(second.updated_at > first.updated_at);
        assert_eq!(remote.records(&ty).len(), 1);
        assert_eq!(remote.calls().creates, 2);
    }

    #[tokio::test]
    async fn scripted_faults_apply_in_order() {
        let remote = remote();
        let ty = EntityType::from("assets");
        remote.fail_next(Fault::Network);
        remote.fail_next(Fault::Rejected);

        let first = remote.create(&ty, EntityId::new(), &Payload::new()).await;
        let second = remote.create(&ty, EntityId::new(), &Payload::new()).await;
        let third = remote.create(&ty, EntityId::new(), &Payload::new()).await;

        assert!(first.unwrap_err().is_retryable());
        assert!(matches!(second, Err(RemoteError::Rejected(_))));
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn offline_fails_every_call() {
        let remote = remote();
        remote.set_online(false);
        let err = remote
            .query_changed_since(&EntityType::from("assets"), None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn changed_since_includes_tombstones() {
        let remote = remote();
        let ty = EntityType::from("assets");
        let kept = remote.write_remote(&ty, EntityId::new(), Payload::new(), 10);
        let gone = EntityId::new();
        remote.write_remote(&ty, gone, Payload::new(), 20);
        remote.delete_remote(&ty, gone, 30);

        let changes = remote.query_changed_since(&ty, Some(kept.updated_at)).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].deleted);
        assert_eq!(remote.records(&ty).len(), 1);
    }
}
