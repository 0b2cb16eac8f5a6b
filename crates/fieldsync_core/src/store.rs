//! The local store: journal replay, commits and maintenance.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::{Batch, JournalRecord, Mutation, JOURNAL_FORMAT};
use crate::metadata::SCHEMA_VERSION_KEY;
use crate::tables::Tables;
use fieldsync_protocol::{from_cbor, to_cbor, SyncStatus, Timestamp};
use fieldsync_storage::{
    EncryptedBackend, EncryptionKey, FileBackend, InMemoryBackend, StorageBackend,
};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use tracing::{debug, info, warn};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// A journal frame that could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptFrame {
    /// Position of the frame in the journal.
    pub index: u64,
    /// Why it was skipped.
    pub reason: String,
}

/// Durable local store for entities, the sync queue, metadata and
/// conflict cases.
///
/// All state lives in memory and every change is first appended to the
/// journal as one frame, so a batch of mutations is either fully replayed
/// on the next open or not at all.
///
/// Reads take a shared lock; writes are serialized.
pub struct LocalStore {
    _dir: Option<StoreDir>,
    backend: Mutex<Box<dyn StorageBackend>>,
    pub(crate) tables: RwLock<Tables>,
    config: StoreConfig,
    corruption: Vec<CorruptFrame>,
}

impl LocalStore {
    /// Opens or creates a store in a directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another process has the store
    /// open, or an error if the journal cannot be read.
    pub fn open(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        Self::build(Some(dir), Box::new(backend), config)
    }

    /// Opens or creates a store whose journal frames are encrypted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if `key` does not match the journal.
    pub fn open_encrypted(
        path: &Path,
        key: &EncryptionKey,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let backend = EncryptedBackend::new(FileBackend::open(&dir.journal_path())?, key);
        Self::build(Some(dir), Box::new(backend), config)
    }

    /// Opens a store over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        Self::build(None, backend, config)
    }

    /// Opens an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error only if initializing metadata fails.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with(StoreConfig::default())
    }

    /// Opens an empty in-memory store with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error only if initializing metadata fails.
    pub fn open_in_memory_with(config: StoreConfig) -> CoreResult<Self> {
        Self::build(None, Box::new(InMemoryBackend::new()), config)
    }

    fn build(
        dir: Option<StoreDir>,
        mut backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let scan = backend.scan()?;
        let mut tables = Tables::default();
        let mut corruption: Vec<CorruptFrame> = scan
            .damaged
            .iter()
            .map(|d| CorruptFrame {
                index: d.index,
                reason: d.reason.clone(),
            })
            .collect();

        for frame in &scan.frames {
            match from_cbor::<JournalRecord>(&frame.body) {
                Ok(record) if record.format() > JOURNAL_FORMAT => {
                    return Err(CoreError::invalid_format(format!(
                        "journal frame {} has format {}, newest supported is {JOURNAL_FORMAT}",
                        frame.index,
                        record.format()
                    )));
                }
                Ok(JournalRecord::Batch { mutations, .. }) => {
                    for mutation in mutations {
                        tables.apply(mutation);
                    }
                }
                Ok(JournalRecord::Snapshot { tables: snapshot, .. }) => tables = snapshot,
                Err(e) => corruption.push(CorruptFrame {
                    index: frame.index,
                    reason: e.to_string(),
                }),
            }
        }
        corruption.sort_by_key(|c| c.index);

        for frame in &corruption {
            warn!(index = frame.index, reason = %frame.reason, "skipped corrupt journal frame");
        }
        if !corruption.is_empty() {
            // Later appends would land behind the damaged bytes; write the
            // recovered state out as a fresh journal.
            backend.rewrite(&snapshot_frames(&tables, config.snapshot_frame_bytes)?)?;
            backend.sync()?;
        }
        debug!(
            frames = scan.frames.len(),
            corrupt = corruption.len(),
            "replayed journal"
        );

        let store = Self {
            _dir: dir,
            backend: Mutex::new(backend),
            tables: RwLock::new(tables),
            config,
            corruption,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> CoreResult<()> {
        self.write(|tables, batch| {
            match tables.metadata.get(SCHEMA_VERSION_KEY) {
                None => batch.set_meta(SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_string()),
                Some(raw) => {
                    let version: u32 = raw.parse().map_err(|_| {
                        CoreError::invalid_format(format!("bad schema version {raw:?}"))
                    })?;
                    if version > SCHEMA_VERSION {
                        return Err(CoreError::invalid_format(format!(
                            "store schema {version} is newer than supported {SCHEMA_VERSION}"
                        )));
                    }
                }
            }

            // An upload interrupted by a crash never got its outcome.
            let mut recovered = 0usize;
            for record in tables.all_entities() {
                if record.sync_status == SyncStatus::Syncing {
                    let mut record = record.clone();
                    record.sync_status = SyncStatus::Pending;
                    batch.put_entity(record);
                    recovered += 1;
                }
            }
            if recovered > 0 {
                info!(recovered, "reset interrupted uploads to pending");
            }
            Ok(())
        })
    }

    /// Runs `f` against the current tables and commits the mutations it
    /// collects as one journal frame.
    ///
    /// Nothing is written if `f` returns an error or collects nothing.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a storage error if the commit fails.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&Tables, &mut Batch) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut tables = self.tables.write();
        let mut batch = Batch::new(self.now(), tables.next_op);
        let out = f(&tables, &mut batch)?;
        if !batch.is_empty() {
            self.commit(&mut tables, batch.into_mutations())?;
        }
        Ok(out)
    }

    fn commit(&self, tables: &mut Tables, mutations: Vec<Mutation>) -> CoreResult<()> {
        let record = JournalRecord::Batch {
            format: JOURNAL_FORMAT,
            mutations,
        };
        let bytes = to_cbor(&record)?;
        {
            let mut backend = self.backend.lock();
            backend.append_frame(&bytes)?;
            if self.config.sync_on_commit {
                backend.sync()?;
            }
        }
        if let JournalRecord::Batch { mutations, .. } = record {
            for mutation in mutations {
                tables.apply(mutation);
            }
        }
        Ok(())
    }

    /// Current time from the configured clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.config.clock.now()
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Frames skipped during the last open because they were damaged or
    /// could not be decoded.
    #[must_use]
    pub fn corruption_report(&self) -> &[CorruptFrame] {
        &self.corruption
    }

    /// Number of frames in the journal.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.backend.lock().frame_count()
    }

    /// Returns true if the journal has grown past the compaction threshold.
    #[must_use]
    pub fn needs_compaction(&self) -> bool {
        self.frame_count() > self.config.compact_threshold
    }

    /// Rewrites the journal as a snapshot of the current tables.
    ///
    /// A store larger than [`StoreConfig::snapshot_frame_bytes`] is written
    /// as several frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn compact(&self) -> CoreResult<()> {
        let tables = self.tables.read();
        let frames = snapshot_frames(&tables, self.config.snapshot_frame_bytes)?;
        let mut backend = self.backend.lock();
        let before = backend.frame_count();
        backend.rewrite(&frames)?;
        backend.sync()?;
        info!(before, after = frames.len(), "compacted journal");
        Ok(())
    }

    /// Flushes the journal to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }
}

/// Encodes `tables` as journal frames.
///
/// A store that fits in `budget` bytes becomes one snapshot. A larger one
/// becomes a snapshot of its metadata and op sequence followed by batches
/// that re-insert every row, each batch holding at most `budget` bytes of
/// mutations unless a single row is bigger.
fn snapshot_frames(tables: &Tables, budget: usize) -> CoreResult<Vec<Vec<u8>>> {
    let header = Tables {
        metadata: tables.metadata.clone(),
        next_op: tables.next_op,
        ..Tables::default()
    };
    let rows = tables
        .all_entities()
        .cloned()
        .map(Mutation::PutEntity)
        .chain(tables.queue.values().cloned().map(Mutation::PutOp))
        .chain(tables.failed.values().cloned().map(Mutation::PutFailedOp))
        .chain(tables.conflicts.values().cloned().map(Mutation::PutConflict));

    let mut frames = vec![encode_snapshot(header)?];
    let mut chunk = Vec::new();
    let mut chunk_bytes = 0usize;
    for mutation in rows {
        let size = to_cbor(&mutation)?.len();
        if !chunk.is_empty() && chunk_bytes + size > budget {
            frames.push(encode_batch(std::mem::take(&mut chunk))?);
            chunk_bytes = 0;
        }
        chunk_bytes += size;
        chunk.push(mutation);
    }
    if !chunk.is_empty() {
        frames.push(encode_batch(chunk)?);
    }

    if frames.len() <= 2 && frames.iter().map(Vec::len).sum::<usize>() <= budget {
        return Ok(vec![encode_snapshot(tables.clone())?]);
    }
    Ok(frames)
}

fn encode_snapshot(tables: Tables) -> CoreResult<Vec<u8>> {
    Ok(to_cbor(&JournalRecord::Snapshot {
        format: JOURNAL_FORMAT,
        tables,
    })?)
}

fn encode_batch(mutations: Vec<Mutation>) -> CoreResult<Vec<u8>> {
    Ok(to_cbor(&JournalRecord::Batch {
        format: JOURNAL_FORMAT,
        mutations,
    })?)
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("LocalStore")
            .field("entity_types", &tables.entities.len())
            .field("queued", &tables.queue.len())
            .field("conflicts", &tables.conflicts.len())
            .finish_non_exhaustive()
    }
}
