//! Read/write mapping of a fixed-capacity file.

use crate::error::{StorageError, StorageResult};
use crate::region::MappedRegion;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// A read/write memory mapping of a pre-sized file.
///
/// The file is extended to its capacity when it is opened, so every byte
/// past the last write reads as zero. The capacity is fixed for the
/// lifetime of the mapping and a file that is already larger than the
/// requested capacity is refused.
///
/// # Durability
///
/// - `write_at()` only touches the mapping
/// - `flush_range()` synchronously writes the touched pages to disk
/// - `close()` and `seal()` flush the whole mapping and fsync the file
///
/// # Example
///
/// ```no_run
/// use follow_storage::{MappedRegion, WritableMap};
/// use std::path::Path;
///
/// let mut map = WritableMap::open(Path::new("seg-000001.dat"), 128).unwrap();
/// map.write_at(0, &[1, 2, 3]).unwrap();
/// map.flush_range(0, 3).unwrap();
/// map.close().unwrap();
/// ```
#[derive(Debug)]
pub struct WritableMap {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl WritableMap {
    /// Opens or creates a file of exactly `capacity` bytes and maps it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened, inspected, resized or mapped
    /// - The existing file is larger than `capacity`
    pub fn open(path: &Path, capacity: u64) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StorageError::file("open", path, e))?;

        let current = file
            .metadata()
            .map_err(|e| StorageError::file("stat", path, e))?
            .len();

        if current > capacity {
            return Err(StorageError::CapacityExceeded {
                path: path.to_path_buf(),
                actual: current,
                requested: capacity,
            });
        }

        if current < capacity {
            file.set_len(capacity)
                .map_err(|e| StorageError::file("resize", path, e))?;
        }

        let len = usize::try_from(capacity).map_err(|_| {
            StorageError::file(
                "mmap",
                path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("capacity {capacity} is not addressable"),
                ),
            )
        })?;

        // SAFETY: the file is opened read/write and owned by this struct for
        // as long as the mapping lives. The queue directory lock keeps other
        // processes from resizing it underneath us.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(|e| StorageError::file("mmap", path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
        })
    }

    /// Copies `data` into the mapping at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WritePastEnd`] if the write does not fit.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> StorageResult<()> {
        let size = self.mmap.len();
        let end = offset.checked_add(data.len()).filter(|&end| end <= size);
        let Some(end) = end else {
            return Err(StorageError::WritePastEnd {
                offset,
                len: data.len(),
                size,
            });
        };

        self.mmap[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Synchronously flushes the pages covering `offset..offset + len`.
    ///
    /// After this returns successfully the bytes in that range survive
    /// process termination.
    pub fn flush_range(&self, offset: usize, len: usize) -> StorageResult<()> {
        if len == 0 {
            return Ok(());
        }
        self.mmap
            .flush_range(offset, len)
            .map_err(|e| StorageError::file("flush", &self.path, e))
    }

    /// Synchronously flushes the whole mapping.
    pub fn flush(&self) -> StorageResult<()> {
        self.mmap
            .flush()
            .map_err(|e| StorageError::file("flush", &self.path, e))
    }

    /// Flushes, unmaps and closes the file.
    ///
    /// Both a failed flush and a failed file sync are reported.
    pub fn close(self) -> StorageResult<()> {
        let Self { path, file, mmap } = self;
        let mut errors = Vec::new();

        if let Err(e) = mmap.flush() {
            errors.push(StorageError::file("flush", &path, e));
        }
        drop(mmap);

        if let Err(e) = file.sync_all() {
            errors.push(StorageError::file("close", &path, e));
        }
        drop(file);

        StorageError::join(errors)
    }

    /// Flushes and unmaps the file, then truncates it to `len` bytes.
    ///
    /// This is how a full active segment gives back its unused tail before
    /// it is reopened read-only. Returns the path of the sealed file.
    pub fn seal(self, len: u64) -> StorageResult<PathBuf> {
        let Self { path, file, mmap } = self;

        mmap.flush()
            .map_err(|e| StorageError::file("flush", &path, e))?;
        // The mapping must be gone before the file shrinks underneath it.
        drop(mmap);

        file.set_len(len)
            .map_err(|e| StorageError::file("truncate", &path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::file("sync", &path, e))?;

        Ok(path)
    }
}

impl MappedRegion for WritableMap {
    fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
