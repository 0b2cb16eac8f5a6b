//! Table-oriented request/response messages exchanged with a remote store.
//!
//! Messages travel as JSON bodies. Each request names one table.

use crate::clock::Timestamp;
use crate::ids::EntityId;
use crate::payload::Payload;
use crate::record::RemoteRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Equality filter for `select_where`. All entries must match.
pub type Filter = Payload;

/// A request against a remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TableRequest {
    /// Insert, or replace if the id exists.
    Insert {
        /// Target table.
        table: String,
        /// Record id.
        id: EntityId,
        /// Record data.
        payload: Payload,
    },
    /// Replace an existing record's data (creating it if absent).
    Update {
        /// Target table.
        table: String,
        /// Record id.
        id: EntityId,
        /// Record data.
        payload: Payload,
    },
    /// Delete a record. Deleting a missing record succeeds.
    Delete {
        /// Target table.
        table: String,
        /// Record id.
        id: EntityId,
    },
    /// Select live records whose fields equal the filter.
    SelectWhere {
        /// Target table.
        table: String,
        /// Equality filter.
        filter: Filter,
    },
    /// Select records, tombstones included, changed after `cursor`.
    SelectChangedSince {
        /// Target table.
        table: String,
        /// Exclusive lower bound on `updated_at`.
        cursor: Option<Timestamp>,
    },
}

impl TableRequest {
    /// Table the request targets.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. }
            | Self::SelectWhere { table, .. }
            | Self::SelectChangedSince { table, .. } => table,
        }
    }
}

/// Outcome class of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request was malformed or violates a constraint.
    Rejected,
    /// The table or store is not configured.
    NotConfigured,
    /// The store failed internally; retrying may succeed.
    Unavailable,
}

/// A response from a remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableResponse {
    /// A single record was written or deleted.
    Record {
        /// The stored record.
        record: RemoteRecord,
    },
    /// Records matching a query.
    Records {
        /// Matching records, ordered by `updated_at`.
        records: Vec<RemoteRecord>,
    },
    /// The request failed.
    Error {
        /// Failure class.
        kind: ErrorKind,
        /// Human-readable message.
        message: String,
    },
}

impl TableResponse {
    /// Builds an error response.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Status code an HTTP front end would use for this response.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Record { .. } | Self::Records { .. } => 200,
            Self::Error { kind, .. } => match kind {
                ErrorKind::Rejected => 422,
                ErrorKind::NotConfigured => 501,
                ErrorKind::Unavailable => 503,
            },
        }
    }
}

/// Encodes a message as a JSON body.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json_body<T: Serialize>(message: &T) -> crate::ProtocolResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| crate::ProtocolError::Encode(e.to_string()))
}

/// Decodes a message from a JSON body.
///
/// # Errors
///
/// Returns an error if the body is not a valid message.
pub fn from_json_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> crate::ProtocolResult<T> {
    serde_json::from_slice(body).map_err(|e| crate::ProtocolError::Decode(e.to_string()))
}

/// Returns true if every filter entry equals the matching payload field.
#[must_use]
pub fn filter_matches(filter: &Filter, payload: &Payload) -> bool {
    filter
        .iter()
        .all(|(key, expected)| payload.get(key).unwrap_or(&Value::Null) == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_json_shape() {
        let id = EntityId::new();
        let request = TableRequest::Delete {
            table: "forms".into(),
            id,
        };
        let body = to_json_body(&request).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["op"], "delete");
        assert_eq!(value["table"], "forms");

        let decoded: TableRequest = from_json_body(&body).unwrap();
        assert_eq!(decoded.table(), "forms");
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            TableResponse::error(ErrorKind::NotConfigured, "x").http_status(),
            501
        );
        assert_eq!(TableResponse::error(ErrorKind::Rejected, "x").http_status(), 422);
        assert_eq!(
            TableResponse::Records { records: vec![] }.http_status(),
            200
        );
    }

    #[test]
    fn filter_matching() {
        let payload = json!({"site": "north", "active": true}).as_object().cloned().unwrap();
        let hit = json!({"site": "north"}).as_object().cloned().unwrap();
        let miss = json!({"site": "south"}).as_object().cloned().unwrap();
        let missing = json!({"owner": null}).as_object().cloned().unwrap();
        assert!(filter_matches(&hit, &payload));
        assert!(!filter_matches(&miss, &payload));
        assert!(filter_matches(&missing, &payload));
    }

    #[test]
    fn garbage_body_fails() {
        assert!(from_json_body::<TableRequest>(b"{not json").is_err());
    }
}
