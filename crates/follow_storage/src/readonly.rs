//! Read-only mapping of a sealed file.

use crate::error::{StorageError, StorageResult};
use crate::region::MappedRegion;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A read-only memory mapping of an existing file.
///
/// The mapping covers the file as it is when opened; it is never resized,
/// re-mapped or flushed. Dropping the map unmaps and closes the file.
#[derive(Debug)]
pub struct ReadOnlyMap {
    path: PathBuf,
    /// Held for as long as the mapping.
    _file: File,
    mmap: Mmap,
}

impl ReadOnlyMap {
    /// Opens an existing file read-only and maps it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be mapped.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).map_err(|e| StorageError::file("open", path, e))?;

        // SAFETY: the mapping is read-only and the file handle lives as long
        // as the mapping. Sealed files are never written or truncated again,
        // only deleted, which leaves an existing mapping intact.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| StorageError::file("mmap", path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
            mmap,
        })
    }
}

impl MappedRegion for ReadOnlyMap {
    fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
