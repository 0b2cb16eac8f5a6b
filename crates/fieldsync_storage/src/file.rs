//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::StorageResult;
use crate::frame::{decode_frames, encode_frame, FrameScan};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-backed frame journal.
///
/// # Durability
///
/// - `sync()` calls `File::sync_all()`
/// - `rewrite()` writes a sibling `.tmp` file, syncs it and renames it over
///   the journal
///
/// # Example
///
/// ```no_run
/// use fieldsync_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("journal.log")).unwrap();
/// backend.append_frame(b"persistent frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    frames: u64,
}

impl FileBackend {
    /// Opens or creates a journal file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = Self::open_file(path)?;
        let mut backend = Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            frames: 0,
        };
        backend.frames = backend.scan()?.total() as u64;
        Ok(backend)
    }

    /// Opens or creates a journal file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(path: &Path) -> StorageResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

impl StorageBackend for FileBackend {
    fn append_frame(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let encoded = encode_frame(frame)?;
        let mut file = self.file.write();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&encoded)?;
        let index = self.frames;
        self.frames += 1;
        Ok(index)
    }

    fn scan(&self) -> StorageResult<FrameScan> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(decode_frames(&bytes))
    }

    fn rewrite(&mut self, frames: &[Vec<u8>]) -> StorageResult<()> {
        let temp = self.temp_path();
        {
            let mut out = File::create(&temp)?;
            for frame in frames {
                out.write_all(&encode_frame(frame)?)?;
            }
            out.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        *self.file.write() = Self::open_file(&self.path)?;
        self.frames = frames.len() as u64;
        Ok(())
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.frame_count(), 0);
        assert!(path.exists());
    }

    #[test]
    fn frames_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append_frame(b"one").unwrap();
            backend.append_frame(b"two").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.frame_count(), 2);
        let scan = backend.scan().unwrap();
        assert_eq!(scan.frames[0].body, b"one");
        assert_eq!(scan.frames[1].body, b"two");
    }

    #[test]
    fn rewrite_is_visible_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            for i in 0..5u8 {
                backend.append_frame(&[i]).unwrap();
            }
            backend.rewrite(&[b"snapshot".to_vec()]).unwrap();
            backend.append_frame(b"after").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        let bodies: Vec<Vec<u8>> = backend
            .scan()
            .unwrap()
            .frames
            .into_iter()
            .map(|f| f.body)
            .collect();
        assert_eq!(bodies, vec![b"snapshot".to_vec(), b"after".to_vec()]);
        assert!(!dir.path().join("journal.tmp").exists());
    }

    #[test]
    fn torn_tail_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append_frame(b"good").unwrap();
            backend.sync().unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"FS\xff\x00").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        let scan = backend.scan().unwrap();
        assert_eq!(scan.frames.len(), 1);
        assert_eq!(scan.damaged.len(), 1);
    }

    #[test]
    fn create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.log");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
    }
}
