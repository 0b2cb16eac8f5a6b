//! Server configuration.

use fieldsync_protocol::{Clock, SystemClock};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Configuration for the reference remote store.
#[derive(Clone)]
pub struct ServerConfig {
    /// Tables the store serves. `None` accepts any table name.
    pub tables: Option<BTreeSet<String>>,
    /// Fields every written payload must carry, per table.
    pub required_fields: BTreeMap<String, Vec<String>>,
    /// Maximum records returned by one query.
    pub max_select: usize,
    /// Source of `updated_at` stamps.
    pub clock: Arc<dyn Clock>,
}

impl ServerConfig {
    /// Creates a configuration that accepts every table.
    pub fn new() -> Self {
        Self {
            tables: None,
            required_fields: BTreeMap::new(),
            max_select: 500,
            clock: Arc::new(SystemClock),
        }
    }

    /// Restricts the store to the given tables.
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Requires `field` in every payload written to `table`.
    pub fn with_required_field(
        mut self,
        table: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.required_fields
            .entry(table.into())
            .or_default()
            .push(field.into());
        self
    }

    /// Sets the maximum records per query.
    pub fn with_max_select(mut self, max: usize) -> Self {
        self.max_select = max.max(1);
        self
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns true if `table` is served.
    pub fn serves(&self, table: &str) -> bool {
        self.tables.as_ref().map_or(true, |t| t.contains(table))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("tables", &self.tables)
            .field("required_fields", &self.required_fields)
            .field("max_select", &self.max_select)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_serves_everything() {
        let config = ServerConfig::default();
        assert!(config.serves("anything"));
        assert_eq!(config.max_select, 500);
    }

    #[test]
    fn builder() {
        let config = ServerConfig::new()
            .with_tables(["forms"])
            .with_required_field("forms", "title")
            .with_max_select(0);
        assert!(config.serves("forms"));
        assert!(!config.serves("equipment"));
        assert_eq!(config.required_fields["forms"], vec!["title"]);
        assert_eq!(config.max_select, 1);
    }
}
