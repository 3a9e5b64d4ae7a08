//! Queue directory management.
//!
//! This module handles the file system layout of a queue:
//!
//! ```text
//! <queue_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ seg-000001.dat    # Oldest segment
//! ├─ seg-000002.dat
//! └─ seg-000003.dat    # Newest segment (the active one)
//! ```
//!
//! Segment age is encoded in the zero-padded sequence number of the file
//! name, so the archived/active split is recovered from the directory
//! listing alone. The LOCK file ensures only one process opens the queue at
//! a time.

use crate::error::{CoreError, CoreResult};
use follow_storage::StorageError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// File names within the queue directory.
const LOCK_FILE: &str = "LOCK";
const SEGMENT_PREFIX: &str = "seg-";
const SEGMENT_SUFFIX: &str = ".dat";

/// Manages the queue directory structure and file locking.
///
/// # Thread Safety
///
/// The `QueueDir` holds an exclusive lock on the queue directory.
/// Only one `QueueDir` instance can exist per directory at a time.
#[derive(Debug)]
pub struct QueueDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl QueueDir {
    /// Opens or creates a queue directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `QueueLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)
                    .map_err(|e| StorageError::file("create_dir", path, e))?;
            } else {
                return Err(CoreError::invalid_config(format!(
                    "queue directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StorageError::file("open", &lock_path, e))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::QueueLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the queue directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the segment with the given sequence number.
    ///
    /// Sequence 1 produces `seg-000001.dat`.
    #[must_use]
    pub fn segment_path(&self, sequence: u64) -> PathBuf {
        self.path.join(segment_file_name(sequence))
    }

    /// Lists segment sequence numbers, oldest first.
    ///
    /// Files that do not match the `seg-N.dat` pattern are ignored.
    pub fn list_segments(&self) -> CoreResult<Vec<u64>> {
        list_segments(&self.path)
    }

    /// Deletes the segment file with the given sequence number, if present.
    ///
    /// The directory is fsynced afterwards so the deletion is durable.
    pub fn delete_segment(&self, sequence: u64) -> CoreResult<bool> {
        let path = self.segment_path(sequence);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| StorageError::file("remove", &path, e))?;
        self.sync()?;
        Ok(true)
    }

    /// Syncs the queue directory so created or removed entries are durable.
    #[cfg(unix)]
    pub fn sync(&self) -> CoreResult<()> {
        File::open(&self.path)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| StorageError::file("sync_dir", &self.path, e))?;
        Ok(())
    }

    /// Syncs the queue directory so created or removed entries are durable.
    ///
    /// NTFS journals directory metadata; there is no directory fsync.
    #[cfg(not(unix))]
    pub fn sync(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Returns the file name of the segment with the given sequence number.
#[must_use]
pub fn segment_file_name(sequence: u64) -> String {
    format!("{SEGMENT_PREFIX}{sequence:06}{SEGMENT_SUFFIX}")
}

/// Parses a segment file name back into its sequence number.
#[must_use]
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Lists segment sequence numbers found in `path`, oldest first.
///
/// Does not take the directory lock; used by read-only tooling.
pub fn list_segments(path: &Path) -> CoreResult<Vec<u64>> {
    let read_dir = |e: std::io::Error| StorageError::file("read_dir", path, e);
    let mut sequences = Vec::new();
    for entry in fs::read_dir(path).map_err(read_dir)? {
        let entry = entry.map_err(read_dir)?;
        if !entry.file_type().map_err(read_dir)?.is_file() {
            continue;
        }
        if let Some(sequence) = entry.file_name().to_str().and_then(parse_segment_file_name) {
            sequences.push(sequence);
        }
    }
    sequences.sort_unstable();
    Ok(sequences)
}
