//! Sync engine state machine.
//!
//! A run goes through four phases under a single in-flight lock:
//! download, upload, conflict re-evaluation and finalize. Per-operation
//! failures are recorded on the queue and never abort a run; store
//! failures abort it and the next trigger starts over.

use crate::config::SyncConfig;
use crate::conflict::{ConflictResolver, Verdict};
use crate::connectivity::{ConnectivityMonitor, NetworkSignal, Transition};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::remote::RemoteAdapter;
use crate::status::StatusBus;
use fieldsync_core::{CoreError, LocalStore};
use fieldsync_protocol::{
    merge_patch, AnnotatedEntity, ConflictCase, ConflictId, ConflictSide, EntityId,
    EntityRecord, EntityType, OpId, OperationKind, Payload, Priority, RemoteRecord,
    StatusSnapshot, SyncOperation, SyncStatus,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Times a remote record is re-read when local writes keep racing it.
const INBOUND_ATTEMPTS: usize = 3;

/// The phase the engine is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run in flight.
    Idle,
    /// Pulling remote changes.
    Downloading,
    /// Pushing queued operations.
    Uploading,
    /// Re-evaluating open conflicts.
    Resolving,
    /// Recording the run and doing maintenance.
    Finalizing,
}

impl SyncState {
    /// Returns true while a run is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Totals across all runs since the engine was created.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that reached the finalize phase.
    pub runs_completed: u64,
    /// Runs aborted by a store failure.
    pub runs_failed: u64,
    /// Operations acknowledged by the remote.
    pub uploaded: u64,
    /// Remote records applied locally.
    pub downloaded: u64,
    /// Conflict cases opened.
    pub conflicts_detected: u64,
    /// Duration of the last run.
    pub last_run_duration: Option<Duration>,
    /// Last run-level error.
    pub last_error: Option<String>,
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunReport {
    /// Remote records written locally.
    pub downloaded: usize,
    /// Local records removed after remote deletions.
    pub removed: usize,
    /// Conflict cases opened.
    pub conflicts_detected: usize,
    /// Divergences settled by last-writer-wins.
    pub auto_resolved: usize,
    /// Open cases closed because both sides agree.
    pub settled: usize,
    /// Operations acknowledged.
    pub uploaded: usize,
    /// Operations that failed this run.
    pub failed: usize,
    /// Operations evicted after failing for good.
    pub evicted: usize,
    /// Operations held back because their entity awaits a decision.
    pub held: usize,
    /// Entity types whose download failed.
    pub download_failures: usize,
    /// True if the remote reported it is not configured.
    pub not_configured: bool,
    /// True if retryable failures remain queued.
    pub retry_pending: bool,
}

enum Flow {
    Continue,
    Stop,
}

/// Resets the in-progress flag however a run ends.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    _lock: tokio::sync::MutexGuard<'a, ()>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// The offline-first sync engine.
///
/// Owns the local store and one remote adapter. Entity writes go straight
/// to the store; runs are started explicitly, by the scheduler started
/// with [`SyncEngine::start`], or after reconnecting.
pub struct SyncEngine<R: RemoteAdapter> {
    store: Arc<LocalStore>,
    remote: R,
    config: SyncConfig,
    resolver: ConflictResolver,
    connectivity: Arc<ConnectivityMonitor>,
    status: StatusBus,
    run_lock: tokio::sync::Mutex<()>,
    in_progress: AtomicBool,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    retry_at: Mutex<Option<tokio::time::Instant>>,
    pub(crate) schedule_changed: Notify,
}

impl<R: RemoteAdapter> SyncEngine<R> {
    /// Creates an engine over `store` and `remote`.
    pub fn new(store: Arc<LocalStore>, remote: R, config: SyncConfig) -> Self {
        let corrupt = store.corruption_report().len();
        if corrupt > 0 {
            warn!(frames = corrupt, "local journal had corrupt frames on open");
        }
        let connectivity = Arc::new(ConnectivityMonitor::new(config.connectivity.clone()));
        let status = StatusBus::new(store.status_snapshot());
        Self {
            resolver: ConflictResolver::new(config.conflict.clone()),
            store,
            remote,
            config,
            connectivity,
            status,
            run_lock: tokio::sync::Mutex::new(()),
            in_progress: AtomicBool::new(false),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            retry_at: Mutex::new(None),
            schedule_changed: Notify::new(),
        }
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Returns the remote adapter.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the connectivity monitor.
    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    /// Feeds a platform network signal to the connectivity monitor.
    pub fn report_network(&self, signal: &NetworkSignal) -> Transition {
        self.connectivity.report(signal)
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Fails if the store skipped corrupt frames when it was opened.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LocalCorruption`] with the number of frames.
    pub fn check_integrity(&self) -> SyncResult<()> {
        match self.store.corruption_report().len() {
            0 => Ok(()),
            frames => Err(SyncError::LocalCorruption { frames }),
        }
    }

    // Entities

    /// Saves a new entity at the default priority and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn save_entity(&self, entity_type: &EntityType, payload: Payload) -> SyncResult<EntityId> {
        self.save_entity_with_priority(entity_type, payload, self.config.default_priority)
    }

    /// Saves a new entity whose upload drains at `priority`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn save_entity_with_priority(
        &self,
        entity_type: &EntityType,
        payload: Payload,
        priority: Priority,
    ) -> SyncResult<EntityId> {
        let id = EntityId::new();
        self.store.put(entity_type, id, payload, priority)?;
        debug!(%entity_type, %id, %priority, "saved entity");
        self.publish_status();
        Ok(id)
    }

    /// Applies a merge patch to an entity. `null` values remove fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist or the write fails.
    pub fn update_entity(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        patch: &Payload,
    ) -> SyncResult<EntityRecord> {
        let current = self
            .store
            .get(entity_type, id)
            .ok_or_else(|| CoreError::entity_not_found(entity_type, id))?;
        let merged = merge_patch(&current.payload, patch);
        let record = self
            .store
            .put(entity_type, id, merged, self.config.default_priority)?;
        self.publish_status();
        Ok(record)
    }

    /// Returns an entity.
    pub fn get_entity(&self, entity_type: &EntityType, id: EntityId) -> Option<EntityRecord> {
        self.store.get(entity_type, id)
    }

    /// Every entity of a type with its status flags.
    pub fn get_all_entities(&self, entity_type: &EntityType) -> Vec<AnnotatedEntity> {
        self.store
            .get_all(entity_type)
            .iter()
            .map(AnnotatedEntity::from)
            .collect()
    }

    /// Deletes an entity and queues the remote delete. Returns false if it
    /// did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn delete_entity(&self, entity_type: &EntityType, id: EntityId) -> SyncResult<bool> {
        let deleted = self
            .store
            .delete(entity_type, id, self.config.default_priority)?;
        if deleted {
            self.publish_status();
        }
        Ok(deleted)
    }

    // Conflicts and recovery

    /// Conflict cases waiting for a decision.
    pub fn get_conflicts(&self) -> Vec<ConflictCase> {
        self.store.open_conflicts()
    }

    /// Applies `side` to an open case. The chosen payload is queued for
    /// upload and the entity goes back to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the case is missing or already resolved.
    pub fn resolve_conflict(&self, id: ConflictId, side: ConflictSide) -> SyncResult<ConflictCase> {
        let case = self
            .store
            .resolve_conflict(id, side, self.config.default_priority)?;
        self.publish_status();
        Ok(case)
    }

    /// Moves every `Error` entity back to `Pending` and queues it again.
    /// Returns how many were reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn retry_failed(&self) -> SyncResult<usize> {
        let reset = self.store.reset_failed(self.config.default_priority)?;
        if reset > 0 {
            info!(reset, "requeued failed entities");
            self.publish_status();
        }
        Ok(reset)
    }

    // Status

    /// Current status snapshot.
    pub fn status(&self) -> StatusSnapshot {
        let mut snapshot = self.store.status_snapshot();
        snapshot.in_progress = self.in_progress.load(Ordering::SeqCst);
        snapshot
    }

    /// Subscribes to status snapshots. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    fn publish_status(&self) {
        self.status.publish(self.status());
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    // Retry timer

    pub(crate) fn retry_deadline(&self) -> Option<tokio::time::Instant> {
        *self.retry_at.lock()
    }

    pub(crate) fn clear_retry(&self) {
        *self.retry_at.lock() = None;
    }

    fn schedule_retry(&self) {
        let at = tokio::time::Instant::now() + self.config.retry.delay;
        *self.retry_at.lock() = Some(at);
        self.schedule_changed.notify_one();
        debug!(delay = ?self.config.retry.delay, "scheduled retry run");
    }

    // Runs

    /// Starts a run unless offline or one is already in flight.
    ///
    /// Returns true if a run took place. Run-level errors are logged.
    pub async fn trigger_sync(&self) -> bool {
        match self.sync_now().await {
            Ok(_) => true,
            Err(SyncError::Offline | SyncError::AlreadyRunning) => false,
            Err(e) => {
                warn!(error = %e, "sync run aborted");
                true
            }
        }
    }

    /// Runs a full sync and returns what it did.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Offline`] or [`SyncError::AlreadyRunning`] if no
    /// run was started, or the store error that aborted the run.
    pub async fn sync_now(&self) -> SyncResult<SyncRunReport> {
        if !self.connectivity.is_online() {
            debug!("sync skipped: offline");
            return Err(SyncError::Offline);
        }
        let Ok(lock) = self.run_lock.try_lock() else {
            debug!("sync skipped: run in flight");
            return Err(SyncError::AlreadyRunning);
        };
        self.in_progress.store(true, Ordering::SeqCst);
        let in_flight = InFlight {
            flag: &self.in_progress,
            _lock: lock,
        };
        self.publish_status();

        let started = Instant::now();
        info!("sync run started");
        let result = self.run().await;
        self.set_state(SyncState::Idle);
        let elapsed = started.elapsed();

        {
            let mut stats = self.stats.write();
            stats.last_run_duration = Some(elapsed);
            match &result {
                Ok(report) => {
                    stats.runs_completed += 1;
                    stats.uploaded += report.uploaded as u64;
                    stats.downloaded += report.downloaded as u64;
                    stats.conflicts_detected += report.conflicts_detected as u64;
                    stats.last_error = None;
                }
                Err(e) => {
                    stats.runs_failed += 1;
                    stats.last_error = Some(e.to_string());
                }
            }
        }

        match &result {
            Ok(report) => info!(
                uploaded = report.uploaded,
                downloaded = report.downloaded,
                conflicts = report.conflicts_detected,
                failed = report.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "sync run finished"
            ),
            Err(e) => warn!(error = %e, "sync run failed"),
        }

        drop(in_flight);
        self.publish_status();
        result
    }

    async fn run(&self) -> SyncResult<SyncRunReport> {
        let mut report = SyncRunReport::default();

        self.set_state(SyncState::Downloading);
        let remote_ready = self.download(&mut report).await?;
        self.publish_status();

        if remote_ready {
            self.set_state(SyncState::Uploading);
            self.upload(&mut report).await?;
        }

        self.set_state(SyncState::Resolving);
        self.resolve_open_conflicts(&mut report)?;

        self.set_state(SyncState::Finalizing);
        self.finalize(&report)?;
        Ok(report)
    }

    /// Returns false if the remote is not configured.
    async fn download(&self, report: &mut SyncRunReport) -> SyncResult<bool> {
        for entity_type in &self.config.entity_types {
            let cursor = self.store.cursor(entity_type);
            let records = match self.remote.query_changed_since(entity_type, cursor).await {
                Ok(records) => records,
                Err(e) if e.is_not_configured() => {
                    debug!(%entity_type, error = %e, "remote not configured");
                    report.not_configured = true;
                    return Ok(false);
                }
                Err(e) => {
                    warn!(%entity_type, error = %e, "download failed");
                    report.download_failures += 1;
                    report.retry_pending |= e.is_retryable();
                    continue;
                }
            };

            debug!(%entity_type, count = records.len(), ?cursor, "downloaded changes");
            let mut newest = cursor;
            for remote in &records {
                self.apply_inbound(entity_type, remote, report)?;
                newest = newest.max(Some(remote.updated_at));
            }
            if let Some(newest) = newest {
                self.store.advance_cursor(entity_type, newest)?;
            }
        }
        Ok(true)
    }

    fn apply_inbound(
        &self,
        entity_type: &EntityType,
        remote: &RemoteRecord,
        report: &mut SyncRunReport,
    ) -> SyncResult<()> {
        for _ in 0..INBOUND_ATTEMPTS {
            if self.try_apply_inbound(entity_type, remote, report)? {
                return Ok(());
            }
        }
        warn!(
            %entity_type,
            id = %remote.id,
            "remote change not applied, local record kept changing"
        );
        Ok(())
    }

    /// Returns false if a local write raced the decision and the record
    /// must be read again.
    fn try_apply_inbound(
        &self,
        entity_type: &EntityType,
        remote: &RemoteRecord,
        report: &mut SyncRunReport,
    ) -> SyncResult<bool> {
        let id = remote.id;
        let Some(local) = self.store.get(entity_type, id) else {
            if remote.deleted || self.store.has_pending_delete(entity_type, id) {
                return Ok(true);
            }
            let applied = self.store.apply_remote_if_unchanged(entity_type, remote, None)?;
            if applied {
                report.downloaded += 1;
            }
            return Ok(applied);
        };

        // Versions at or before the last one we applied or confirmed,
        // including the echo of our own upload.
        if local
            .remote_updated_at
            .is_some_and(|seen| remote.updated_at <= seen)
        {
            return Ok(true);
        }

        match local.sync_status {
            SyncStatus::Synced => {
                if remote.deleted || local.content_hash != remote.content_hash() {
                    if !self
                        .store
                        .apply_remote_if_unchanged(entity_type, remote, Some(&local))?
                    {
                        return Ok(false);
                    }
                    if remote.deleted {
                        report.removed += 1;
                    } else {
                        report.downloaded += 1;
                    }
                }
            }
            SyncStatus::Conflict => {
                if let Some(case) = self.store.conflict_for_entity(entity_type, id) {
                    let fields = self.resolver.divergent_fields(
                        entity_type,
                        &case.local_data,
                        &remote.payload,
                        remote.deleted,
                    );
                    match self.store.refresh_conflict(case.id, remote, fields) {
                        Ok(_) => {}
                        Err(e) if already_closed(&e) => {
                            debug!(conflict = %case.id, "case closed during download");
                            return Ok(false);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            SyncStatus::Pending | SyncStatus::Syncing | SyncStatus::Error => {
                match self.resolver.evaluate(&local, remote) {
                    Verdict::Agree => {
                        debug!(%entity_type, %id, "remote change agrees with local edit");
                    }
                    Verdict::LastWriterWins(side) => {
                        self.apply_last_writer(entity_type, id, remote, side)?;
                        report.auto_resolved += 1;
                    }
                    Verdict::Conflict(fields) => {
                        let case = self.store.open_conflict(entity_type, id, remote, fields)?;
                        info!(
                            conflict = %case.id,
                            %entity_type,
                            %id,
                            fields = ?case.conflict_fields,
                            "conflict detected"
                        );
                        report.conflicts_detected += 1;
                    }
                }
            }
        }
        Ok(true)
    }

    fn apply_last_writer(
        &self,
        entity_type: &EntityType,
        id: EntityId,
        remote: &RemoteRecord,
        side: ConflictSide,
    ) -> SyncResult<()> {
        let priority = self.config.default_priority;
        match side {
            ConflictSide::Remote if remote.deleted => {
                self.store.discard_for_entity(entity_type, id)?;
                self.store.remove_synced(entity_type, id)?;
            }
            ConflictSide::Remote => {
                self.store
                    .supersede(entity_type, id, remote.payload.clone(), priority)?;
            }
            ConflictSide::Local => {
                self.store.requeue(entity_type, id, priority)?;
            }
        }
        info!(%entity_type, %id, %side, "divergence resolved by last writer");
        Ok(())
    }

    async fn upload(&self, report: &mut SyncRunReport) -> SyncResult<()> {
        let max_attempts = self.config.retry.max_attempts;
        let batch_size = self.config.upload_batch_size;
        let mut visited: HashSet<(EntityType, EntityId)> = HashSet::new();
        let mut attempted: HashSet<OpId> = HashSet::new();

        loop {
            let batch: Vec<SyncOperation> = self
                .store
                .dequeue_batch(max_attempts, attempted.len() + batch_size)
                .into_iter()
                .filter(|op| !attempted.contains(&op.id))
                .take(batch_size)
                .collect();
            if batch.is_empty() {
                return Ok(());
            }

            for op in batch {
                attempted.insert(op.id);
                let key = (op.entity_type.clone(), op.entity_id);
                if !visited.insert(key) {
                    continue;
                }
                // An entity's operations go out oldest first, so a later
                // edit never lands before an earlier one.
                let ops: Vec<SyncOperation> = self
                    .store
                    .ops_for_entity(&op.entity_type, op.entity_id)
                    .into_iter()
                    .filter(|o| o.retry_count < max_attempts)
                    .collect();
                for entity_op in ops {
                    attempted.insert(entity_op.id);
                    match self.upload_one(&entity_op, report).await? {
                        Some(Flow::Continue) => {}
                        Some(Flow::Stop) => return Ok(()),
                        None => break,
                    }
                }
                self.publish_status();
            }
        }
    }

    /// Uploads one operation. `None` means the entity's remaining
    /// operations should wait.
    async fn upload_one(
        &self,
        op: &SyncOperation,
        report: &mut SyncRunReport,
    ) -> SyncResult<Option<Flow>> {
        let (entity_type, id) = (&op.entity_type, op.entity_id);
        if let Some(record) = self.store.get(entity_type, id) {
            match record.sync_status {
                SyncStatus::Conflict | SyncStatus::Error => {
                    report.held += 1;
                    return Ok(None);
                }
                _ => self.store.set_status(entity_type, id, SyncStatus::Syncing)?,
            }
        }

        let empty = Payload::new();
        let payload = op.payload.as_ref().unwrap_or(&empty);
        let result = match op.kind {
            OperationKind::Create => self.remote.create(entity_type, id, payload).await,
            OperationKind::Update => self.remote.update(entity_type, id, payload).await,
            OperationKind::Delete => self.remote.delete(entity_type, id).await,
        };

        match result {
            Ok(confirmed) => {
                self.store.ack(op.id, Some(confirmed.updated_at))?;
                report.uploaded += 1;
                debug!(op = %op.id, kind = %op.kind, %entity_type, %id, "uploaded");
                Ok(Some(Flow::Continue))
            }
            Err(e) if e.is_not_configured() => {
                self.store.release(op.id)?;
                report.not_configured = true;
                debug!(error = %e, "remote not configured, upload stopped");
                Ok(Some(Flow::Stop))
            }
            Err(e) => self.record_failure(op, &e, report).map(|network| {
                if network {
                    Some(Flow::Stop)
                } else {
                    None
                }
            }),
        }
    }

    /// Returns true if the failure was a network error.
    fn record_failure(
        &self,
        op: &SyncOperation,
        error: &RemoteError,
        report: &mut SyncRunReport,
    ) -> SyncResult<bool> {
        let outcome = self.store.nack(
            op.id,
            &error.to_string(),
            error.is_retryable(),
            self.config.retry.max_attempts,
        )?;
        report.failed += 1;
        if outcome.is_evicted() {
            report.evicted += 1;
        } else {
            report.retry_pending = true;
            warn!(
                op = %op.id,
                entity_type = %op.entity_type,
                entity_id = %op.entity_id,
                ?outcome,
                error = %error,
                "upload failed"
            );
        }
        Ok(error.is_retryable())
    }

    fn resolve_open_conflicts(&self, report: &mut SyncRunReport) -> SyncResult<()> {
        self.resolve_cases(self.store.open_conflicts(), report)
    }

    /// Re-judges `cases`. A case the user closed since the list was taken
    /// is skipped.
    fn resolve_cases(
        &self,
        cases: Vec<ConflictCase>,
        report: &mut SyncRunReport,
    ) -> SyncResult<()> {
        for case in cases {
            let outcome = match self.resolver.reevaluate(&case) {
                Verdict::Agree => self
                    .store
                    .settle_conflict(case.id, case.remote_modified)
                    .map(|_| {
                        report.settled += 1;
                        info!(conflict = %case.id, "conflict settled, both sides agree");
                    }),
                Verdict::LastWriterWins(side) => self
                    .store
                    .resolve_conflict(case.id, side, self.config.default_priority)
                    .map(|_| report.auto_resolved += 1),
                Verdict::Conflict(_) => Ok(()),
            };
            match outcome {
                Ok(()) => {}
                Err(e) if already_closed(&e) => {
                    debug!(conflict = %case.id, error = %e, "case already closed, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn finalize(&self, report: &SyncRunReport) -> SyncResult<()> {
        let now = self.store.now();
        self.store.set_last_sync(now)?;

        let pruned = self
            .store
            .prune_resolved_conflicts(now.saturating_sub(self.config.maintenance.retention_ms()))?;
        if pruned > 0 {
            debug!(pruned, "pruned resolved conflicts");
        }
        if self.config.maintenance.compact && self.store.needs_compaction() {
            match self.store.compact() {
                Ok(()) => info!(frames = self.store.frame_count(), "compacted journal"),
                Err(e) => warn!(error = %e, "journal compaction failed, will retry next run"),
            }
        }

        if report.retry_pending && !report.not_configured {
            self.schedule_retry();
        } else {
            self.clear_retry();
        }
        Ok(())
    }
}

/// True for store errors meaning a case was closed by another writer.
fn already_closed(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::ConflictResolved(_) | CoreError::ConflictNotFound(_)
    )
}

impl<R: RemoteAdapter> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
