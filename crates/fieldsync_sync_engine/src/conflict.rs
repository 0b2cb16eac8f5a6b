//! Conflict detection and automatic resolution.

use crate::config::ConflictConfig;
use fieldsync_protocol::{
    ConflictCase, ConflictSide, EntityRecord, EntityType, Payload, RemoteRecord, Timestamp,
};
use std::collections::BTreeSet;

/// What to do with an inbound remote record that meets an unsynced local
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No significant field differs.
    Agree,
    /// The versions differ and are far enough apart in time that the newer
    /// one wins.
    LastWriterWins(ConflictSide),
    /// The versions differ within the threshold; a person has to decide.
    Conflict(BTreeSet<String>),
}

/// Compares local and remote versions under the configured field policies.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    config: ConflictConfig,
}

impl ConflictResolver {
    /// Creates a resolver.
    pub fn new(config: ConflictConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConflictConfig {
        &self.config
    }

    /// Significant fields that differ between two versions of an entity.
    ///
    /// A remote deletion differs in every significant local field.
    pub fn divergent_fields(
        &self,
        entity_type: &EntityType,
        local: &Payload,
        remote: &Payload,
        remote_deleted: bool,
    ) -> BTreeSet<String> {
        let policy = self.config.policy_for(entity_type);
        if remote_deleted {
            local
                .keys()
                .filter(|f| policy.is_significant(f))
                .cloned()
                .collect()
        } else {
            policy.diff(local, remote)
        }
    }

    /// Judges a remote record against a local record with unsynced changes.
    ///
    /// A remote deletion always diverges from a live local record.
    pub fn evaluate(&self, local: &EntityRecord, remote: &RemoteRecord) -> Verdict {
        let fields = self.divergent_fields(
            &local.entity_type,
            &local.payload,
            &remote.payload,
            remote.deleted,
        );
        if fields.is_empty() && !remote.deleted {
            return Verdict::Agree;
        }
        self.judge(local.last_modified, remote.updated_at, fields)
    }

    /// Re-judges an open case with its current data.
    pub fn reevaluate(&self, case: &ConflictCase) -> Verdict {
        let fields = self.divergent_fields(
            &case.entity_type,
            &case.local_data,
            &case.remote_data,
            case.remote_deleted,
        );
        if fields.is_empty() && !case.remote_deleted {
            return Verdict::Agree;
        }
        self.judge(case.local_modified, case.remote_modified, fields)
    }

    fn judge(&self, local: Timestamp, remote: Timestamp, fields: BTreeSet<String>) -> Verdict {
        if local.abs_diff(remote) > self.config.threshold_ms().unsigned_abs() {
            let side = if local > remote {
                ConflictSide::Local
            } else {
                ConflictSide::Remote
            };
            Verdict::LastWriterWins(side)
        } else {
            Verdict::Conflict(fields)
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictConfig::default())
    }
}
