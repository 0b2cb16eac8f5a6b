//! Conflict cases and field-level divergence.

use crate::clock::Timestamp;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ConflictId, EntityId, EntityType};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Which side of a conflict wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSide {
    /// Keep the device's version.
    Local,
    /// Take the remote version.
    Remote,
}

impl fmt::Display for ConflictSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

impl FromStr for ConflictSide {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(ProtocolError::parse("conflict side", s)),
        }
    }
}

/// A divergence between the local and remote versions of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCase {
    /// Case id.
    pub id: ConflictId,
    /// Entity type.
    pub entity_type: EntityType,
    /// Entity id.
    pub entity_id: EntityId,
    /// Local payload when the case was detected.
    pub local_data: Payload,
    /// Remote payload, empty if the remote deleted the entity.
    pub remote_data: Payload,
    /// Local modification time.
    pub local_modified: Timestamp,
    /// Remote modification time.
    pub remote_modified: Timestamp,
    /// True if the remote side is a deletion.
    #[serde(default)]
    pub remote_deleted: bool,
    /// Significant fields whose values differ.
    pub conflict_fields: BTreeSet<String>,
    /// When the case was opened.
    pub detected_at: Timestamp,
    /// True once a side has been chosen.
    pub resolved: bool,
    /// The chosen side.
    pub resolution: Option<ConflictSide>,
    /// When the case was resolved.
    pub resolved_at: Option<Timestamp>,
}

impl ConflictCase {
    /// Absolute distance between the two modification times.
    #[must_use]
    pub fn time_gap(&self) -> i64 {
        (self.local_modified - self.remote_modified).abs()
    }

    /// Marks the case resolved in favour of `side`.
    pub fn resolve(&mut self, side: ConflictSide, at: Timestamp) {
        self.resolved = true;
        self.resolution = Some(side);
        self.resolved_at = Some(at);
    }

    /// Payload of the chosen side.
    #[must_use]
    pub fn payload_for(&self, side: ConflictSide) -> &Payload {
        match side {
            ConflictSide::Local => &self.local_data,
            ConflictSide::Remote => &self.remote_data,
        }
    }
}

/// Which payload fields count when comparing two versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Only the listed fields are compared.
    Only(BTreeSet<String>),
    /// Every field is compared except the listed ones and any field whose
    /// name starts with `_`.
    AllExcept(BTreeSet<String>),
}

impl FieldPolicy {
    /// Bookkeeping fields ignored by [`FieldPolicy::default`].
    pub const BOOKKEEPING_FIELDS: &'static [&'static str] =
        &["id", "created_at", "updated_at", "last_modified"];

    /// Compares only `fields`.
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(fields.into_iter().map(Into::into).collect())
    }

    /// Returns true if `field` takes part in comparisons.
    #[must_use]
    pub fn is_significant(&self, field: &str) -> bool {
        match self {
            Self::Only(fields) => fields.contains(field),
            Self::AllExcept(ignored) => !field.starts_with('_') && !ignored.contains(field),
        }
    }

    /// Returns the significant fields whose values differ between `local`
    /// and `remote`. A field present on one side only counts as different.
    #[must_use]
    pub fn diff(&self, local: &Payload, remote: &Payload) -> BTreeSet<String> {
        local
            .keys()
            .chain(remote.keys())
            .filter(|field| self.is_significant(field))
            .filter(|field| local.get(*field) != remote.get(*field))
            .cloned()
            .collect()
    }
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self::AllExcept(
            Self::BOOKKEEPING_FIELDS
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn side_parse() {
        assert_eq!("local".parse::<ConflictSide>().unwrap(), ConflictSide::Local);
        assert_eq!("Remote".parse::<ConflictSide>().unwrap(), ConflictSide::Remote);
        assert!("both".parse::<ConflictSide>().is_err());
    }

    #[test]
    fn default_policy_ignores_bookkeeping() {
        let policy = FieldPolicy::default();
        let local = obj(json!({"status": "ok", "updated_at": 1, "_local_only": true}));
        let remote = obj(json!({"status": "ok", "updated_at": 2}));
        assert!(policy.diff(&local, &remote).is_empty());
    }

    #[test]
    fn diff_reports_changed_and_missing_fields() {
        let policy = FieldPolicy::default();
        let local = obj(json!({"status": "ok", "reading": 4.2}));
        let remote = obj(json!({"status": "failed", "inspector": "kim"}));
        let fields: Vec<String> = policy.diff(&local, &remote).into_iter().collect();
        assert_eq!(fields, vec!["inspector", "reading", "status"]);
    }

    #[test]
    fn only_policy_limits_comparison() {
        let policy = FieldPolicy::only(["status"]);
        let local = obj(json!({"status": "ok", "notes": "a"}));
        let remote = obj(json!({"status": "ok", "notes": "b"}));
        assert!(policy.diff(&local, &remote).is_empty());
    }

    #[test]
    fn resolve_records_side() {
        let mut case = ConflictCase {
            id: ConflictId::new(),
            entity_type: "forms".into(),
            entity_id: EntityId::new(),
            local_data: obj(json!({"v": 1})),
            remote_data: obj(json!({"v": 2})),
            local_modified: 1_000,
            remote_modified: 400,
            remote_deleted: false,
            conflict_fields: BTreeSet::from(["v".to_string()]),
            detected_at: 2_000,
            resolved: false,
            resolution: None,
            resolved_at: None,
        };
        assert_eq!(case.time_gap(), 600);
        case.resolve(ConflictSide::Remote, 3_000);
        assert!(case.resolved);
        assert_eq!(case.payload_for(ConflictSide::Remote), &obj(json!({"v": 2})));
    }
}
