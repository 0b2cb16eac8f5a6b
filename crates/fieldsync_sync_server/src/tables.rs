//! Authoritative table storage.
//!
//! Every write stamps the row with an `updated_at` strictly greater than any
//! stamp handed out before, so `changed_since(cursor)` never misses a write
//! that lands in the same millisecond as the cursor.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use fieldsync_protocol::{filter_matches, EntityId, Filter, Payload, RemoteRecord, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, BTreeMap<EntityId, RemoteRecord>>,
    last_stamp: Timestamp,
}

impl State {
    fn stamp(&mut self, now: Timestamp) -> Timestamp {
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }
}

/// In-memory tables holding the authoritative copy of every record.
///
/// Deletes leave tombstones so incremental readers learn about them.
#[derive(Debug)]
pub struct RemoteTables {
    config: ServerConfig,
    state: RwLock<State>,
}

impl RemoteTables {
    /// Creates empty tables.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
        }
    }

    fn check_table(&self, table: &str) -> ServerResult<()> {
        if self.config.serves(table) {
            Ok(())
        } else {
            Err(ServerError::UnknownTable(table.to_string()))
        }
    }

    fn check_payload(&self, table: &str, payload: &Payload) -> ServerResult<()> {
        if let Some(required) = self.config.required_fields.get(table) {
            if let Some(missing) = required.iter().find(|f| !payload.contains_key(*f)) {
                return Err(ServerError::InvalidRequest(format!(
                    "{table}: missing required field {missing:?}"
                )));
            }
        }
        Ok(())
    }

    /// Inserts a record, replacing any existing one with the same id.
    ///
    /// Inserting over a tombstone revives the record.
    pub fn insert(
        &self,
        table: &str,
        id: EntityId,
        payload: Payload,
    ) -> ServerResult<RemoteRecord> {
        self.check_table(table)?;
        self.check_payload(table, &payload)?;
        let now = self.config.clock.now();
        Ok(self.write_row(table, id, payload, now))
    }

    /// Replaces a record's data, creating it if absent.
    pub fn update(
        &self,
        table: &str,
        id: EntityId,
        payload: Payload,
    ) -> ServerResult<RemoteRecord> {
        self.insert(table, id, payload)
    }

    /// Writes a row stamped no earlier than `at`.
    ///
    /// Used to simulate writes made by other clients at a known time.
    pub fn write_as_of(
        &self,
        table: &str,
        id: EntityId,
        payload: Payload,
        at: Timestamp,
    ) -> ServerResult<RemoteRecord> {
        self.check_table(table)?;
        Ok(self.write_row(table, id, payload, at))
    }

    fn write_row(
        &self,
        table: &str,
        id: EntityId,
        payload: Payload,
        at: Timestamp,
    ) -> RemoteRecord {
        let mut state = self.state.write();
        let updated_at = state.stamp(at);
        let record = RemoteRecord {
            id,
            payload,
            updated_at,
            deleted: false,
        };
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, record.clone());
        record
    }

    /// Deletes a record, leaving a tombstone.
    ///
    /// Deleting a missing or already deleted record succeeds without
    /// writing anything.
    pub fn delete(&self, table: &str, id: EntityId) -> ServerResult<RemoteRecord> {
        self.check_table(table)?;
        let now = self.config.clock.now();
        let mut state = self.state.write();
        let existing = state.tables.get(table).and_then(|t| t.get(&id)).cloned();
        match existing {
            Some(record) if record.deleted => Ok(record),
            Some(_) => {
                let updated_at = state.stamp(now);
                let tombstone = RemoteRecord {
                    id,
                    payload: Payload::new(),
                    updated_at,
                    deleted: true,
                };
                state
                    .tables
                    .entry(table.to_string())
                    .or_default()
                    .insert(id, tombstone.clone());
                Ok(tombstone)
            }
            None => Ok(RemoteRecord {
                id,
                payload: Payload::new(),
                updated_at: state.last_stamp,
                deleted: true,
            }),
        }
    }

    /// Live records whose fields equal `filter`, ordered by `updated_at`.
    pub fn select_where(&self, table: &str, filter: &Filter) -> ServerResult<Vec<RemoteRecord>> {
        self.check_table(table)?;
        let state = self.state.read();
        let mut rows: Vec<RemoteRecord> = state
            .tables
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|r| !r.deleted && filter_matches(filter, &r.payload))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.updated_at);
        rows.truncate(self.config.max_select);
        Ok(rows)
    }

    /// Records, tombstones included, with `updated_at > cursor`, oldest
    /// first and at most `max_select` of them.
    pub fn changed_since(
        &self,
        table: &str,
        cursor: Option<Timestamp>,
    ) -> ServerResult<Vec<RemoteRecord>> {
        self.check_table(table)?;
        let state = self.state.read();
        let mut rows: Vec<RemoteRecord> = state
            .tables
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|r| cursor.map_or(true, |c| r.updated_at > c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.updated_at);
        rows.truncate(self.config.max_select);
        Ok(rows)
    }

    /// Returns a record, tombstones included.
    pub fn get(&self, table: &str, id: EntityId) -> Option<RemoteRecord> {
        self.state
            .read()
            .tables
            .get(table)
            .and_then(|t| t.get(&id))
            .cloned()
    }

    /// Number of live records in a table.
    pub fn live_count(&self, table: &str) -> usize {
        self.state
            .read()
            .tables
            .get(table)
            .map_or(0, |t| t.values().filter(|r| !r.deleted).count())
    }
}
