//! Mapped region trait definition.

use std::fmt;
use std::path::Path;

/// A memory-mapped file viewed as a flat byte slice.
///
/// Regions are **opaque byte stores**. Callers address them with plain
/// integer offsets; nothing outside the region holds references into the
/// mapping, so a region can be unmapped or replaced without invalidating
/// anybody's bookkeeping.
///
/// # Invariants
///
/// - `as_bytes().len() == len()` for the lifetime of the region
/// - The length of a region never changes after it is mapped
/// - Regions must be `Send + Sync` for shared access behind a lock
///
/// # Implementors
///
/// - [`super::WritableMap`] - Read/write mapping of a pre-sized file
/// - [`super::ReadOnlyMap`] - Read-only mapping of a sealed file
/// - [`super::FileSnapshot`] - Heap copy of a file another process may still write
pub trait MappedRegion: fmt::Debug + Send + Sync {
    /// Returns the whole mapping.
    fn as_bytes(&self) -> &[u8];

    /// Returns the path of the backing file.
    fn path(&self) -> &Path;

    /// Returns the size of the mapping in bytes.
    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if the mapping is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
