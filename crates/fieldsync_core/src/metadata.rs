//! Key-value metadata: sync cursors, last-sync time, schema version.

use crate::error::CoreResult;
use crate::store::LocalStore;
use fieldsync_protocol::{EntityType, Timestamp};

pub(crate) const SCHEMA_VERSION_KEY: &str = "schema_version";
const LAST_SYNC_KEY: &str = "last_sync";
const CURSOR_PREFIX: &str = "cursor:";

impl LocalStore {
    /// Returns a raw metadata value.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<String> {
        self.tables.read().metadata.get(key).cloned()
    }

    /// Sets a raw metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn set_meta(&self, key: &str, value: &str) -> CoreResult<()> {
        self.write(|_, batch| {
            batch.set_meta(key, value);
            Ok(())
        })
    }

    /// Schema version recorded in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value is not a number.
    pub fn schema_version(&self) -> CoreResult<Option<u32>> {
        self.meta(SCHEMA_VERSION_KEY)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    crate::CoreError::invalid_format(format!("bad schema version {raw:?}"))
                })
            })
            .transpose()
    }

    /// Last remote `updated_at` applied for an entity type.
    #[must_use]
    pub fn cursor(&self, entity_type: &EntityType) -> Option<Timestamp> {
        self.meta(&cursor_key(entity_type))
            .and_then(|raw| raw.parse().ok())
    }

    /// Advances the cursor of an entity type. Cursors never move backwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn advance_cursor(&self, entity_type: &EntityType, to: Timestamp) -> CoreResult<bool> {
        let key = cursor_key(entity_type);
        self.write(|tables, batch| {
            let current = tables
                .metadata
                .get(&key)
                .and_then(|raw| raw.parse::<Timestamp>().ok());
            if current.is_some_and(|c| c >= to) {
                return Ok(false);
            }
            batch.set_meta(key.clone(), to.to_string());
            Ok(true)
        })
    }

    /// Completion time of the last sync run.
    #[must_use]
    pub fn last_sync(&self) -> Option<Timestamp> {
        self.meta(LAST_SYNC_KEY).and_then(|raw| raw.parse().ok())
    }

    /// Records the completion time of a sync run.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn set_last_sync(&self, at: Timestamp) -> CoreResult<()> {
        self.set_meta(LAST_SYNC_KEY, &at.to_string())
    }
}

fn cursor_key(entity_type: &EntityType) -> String {
    format!("{CURSOR_PREFIX}{entity_type}")
}
