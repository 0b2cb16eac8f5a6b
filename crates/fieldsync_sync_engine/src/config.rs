//! Configuration for the sync engine.

use fieldsync_protocol::{EntityType, FieldPolicy, Priority};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Entity types downloaded on every run.
    pub entity_types: Vec<EntityType>,
    /// Maximum operations taken from the queue per upload batch.
    pub upload_batch_size: usize,
    /// Priority given to writes made without an explicit one.
    pub default_priority: Priority,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Conflict detection configuration.
    pub conflict: ConflictConfig,
    /// Connectivity configuration.
    pub connectivity: ConnectivityConfig,
    /// Post-run maintenance configuration.
    pub maintenance: MaintenanceConfig,
}

impl SyncConfig {
    /// Creates a configuration syncing the given entity types.
    pub fn new<I, T>(entity_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityType>,
    {
        Self {
            entity_types: entity_types.into_iter().map(Into::into).collect(),
            upload_batch_size: 50,
            default_priority: Priority::Normal,
            retry: RetryConfig::default(),
            conflict: ConflictConfig::default(),
            connectivity: ConnectivityConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }

    /// Adds an entity type to download.
    pub fn with_entity_type(mut self, entity_type: impl Into<EntityType>) -> Self {
        let entity_type = entity_type.into();
        if !self.entity_types.contains(&entity_type) {
            self.entity_types.push(entity_type);
        }
        self
    }

    /// Sets the upload batch size. Zero is treated as one.
    pub fn with_upload_batch_size(mut self, size: usize) -> Self {
        self.upload_batch_size = size.max(1);
        self
    }

    /// Sets the default write priority.
    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the conflict configuration.
    pub fn with_conflict(mut self, conflict: ConflictConfig) -> Self {
        self.conflict = conflict;
        self
    }

    /// Sets the connectivity configuration.
    pub fn with_connectivity(mut self, connectivity: ConnectivityConfig) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Sets the maintenance configuration.
    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Vec::<EntityType>::new())
    }
}

/// Configuration for retry behavior.
///
/// Failed uploads are retried on a fixed delay, not with backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Failed attempts after which an operation is evicted.
    pub max_attempts: u32,
    /// Delay before the follow-up run after retryable failures.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_secs(30),
        }
    }

    /// Creates a configuration that evicts on the first failure.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the retry delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Configuration for conflict detection and automatic resolution.
#[derive(Debug, Clone)]
pub struct ConflictConfig {
    /// Modification gaps larger than this resolve to the newer side.
    pub auto_resolve_threshold: Duration,
    /// Field policy for types without their own.
    pub default_policy: FieldPolicy,
    /// Per-type field policies.
    pub policies: BTreeMap<EntityType, FieldPolicy>,
}

impl ConflictConfig {
    /// Sets the auto-resolve threshold.
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.auto_resolve_threshold = threshold;
        self
    }

    /// Sets the policy for one entity type.
    pub fn with_policy(mut self, entity_type: impl Into<EntityType>, policy: FieldPolicy) -> Self {
        self.policies.insert(entity_type.into(), policy);
        self
    }

    /// Sets the fallback policy.
    pub fn with_default_policy(mut self, policy: FieldPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Policy used for `entity_type`.
    pub fn policy_for(&self, entity_type: &EntityType) -> &FieldPolicy {
        self.policies
            .get(entity_type)
            .unwrap_or(&self.default_policy)
    }

    /// Threshold in milliseconds.
    pub fn threshold_ms(&self) -> i64 {
        i64::try_from(self.auto_resolve_threshold.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            auto_resolve_threshold: Duration::from_secs(60 * 60),
            default_policy: FieldPolicy::default(),
            policies: BTreeMap::new(),
        }
    }
}

/// Configuration for connectivity handling and periodic sync.
#[derive(Debug, Clone)]
pub struct ConnectivityConfig {
    /// Whether the device is assumed online before the first signal.
    pub initially_online: bool,
    /// Wait after coming online before the reconnect sync.
    pub stabilization: Duration,
    /// Periodic sync interval on a good connection.
    pub good_interval: Duration,
    /// Periodic sync interval on a degraded connection.
    pub degraded_interval: Duration,
    /// Downlink below this many Mbps counts as degraded.
    pub degraded_downlink_mbps: f64,
    /// Round trips above this many milliseconds count as degraded.
    pub degraded_rtt_ms: u32,
}

impl ConnectivityConfig {
    /// Sets the initial online state.
    pub fn with_initially_online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }

    /// Sets the stabilization delay.
    pub fn with_stabilization(mut self, delay: Duration) -> Self {
        self.stabilization = delay;
        self
    }

    /// Sets the periodic intervals for good and degraded connections.
    pub fn with_intervals(mut self, good: Duration, degraded: Duration) -> Self {
        self.good_interval = good;
        self.degraded_interval = degraded;
        self
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            initially_online: true,
            stabilization: Duration::from_secs(1),
            good_interval: Duration::from_secs(60),
            degraded_interval: Duration::from_secs(300),
            degraded_downlink_mbps: 1.0,
            degraded_rtt_ms: 800,
        }
    }
}

/// Housekeeping done at the end of every run.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Resolved conflict cases older than this are deleted.
    pub resolved_conflict_retention: Duration,
    /// Whether to compact the journal once it passes the store's threshold.
    pub compact: bool,
}

impl MaintenanceConfig {
    /// Sets the retention for resolved conflict cases.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.resolved_conflict_retention = retention;
        self
    }

    /// Enables or disables compaction.
    pub fn with_compaction(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Retention in milliseconds.
    pub fn retention_ms(&self) -> i64 {
        i64::try_from(self.resolved_conflict_retention.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            resolved_conflict_retention: Duration::from_secs(7 * 24 * 60 * 60),
            compact: true,
        }
    }
}
