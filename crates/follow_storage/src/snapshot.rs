//! In-memory copy of a file.

use crate::error::{StorageError, StorageResult};
use crate::region::MappedRegion;
use std::path::{Path, PathBuf};

/// A file read fully into memory.
///
/// Used for files another process may still append to or truncate. A copy
/// cannot be invalidated underneath the reader the way a shared mapping can;
/// it may end in a partially written record instead.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl FileSnapshot {
    /// Reads the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    pub fn read(path: &Path) -> StorageResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| StorageError::file("read", path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }
}

impl MappedRegion for FileSnapshot {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_survives_file_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        std::fs::write(&path, b"head segment").unwrap();

        let snapshot = FileSnapshot::read(&path).unwrap();
        std::fs::write(&path, b"").unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(snapshot.as_bytes(), b"head segment");
        assert_eq!(snapshot.path(), path);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempdir().unwrap();
        let err = FileSnapshot::read(&dir.path().join("gone.dat")).unwrap_err();
        assert!(matches!(err, StorageError::File { op: "read", .. }));
    }
}
