//! # Follow Storage
//!
//! Memory-mapped byte regions for the follow message log.
//!
//! This crate provides the lowest-level storage abstraction for follow.
//! Regions are **opaque byte stores** - they do not interpret the data
//! they hold.
//!
//! ## Design Principles
//!
//! - Regions are plain mapped files (read, write at offset, flush)
//! - No knowledge of message records, indexes, or segment roles
//! - Must be `Send + Sync` so a queue can be shared across threads
//! - follow_core owns all file format interpretation
//!
//! ## Available Regions
//!
//! - [`WritableMap`] - Fixed-capacity read/write mapping for the active segment
//! - [`ReadOnlyMap`] - Read-only mapping for sealed segments
//! - [`FileSnapshot`] - In-memory copy for files owned by another process
//!
//! ## Example
//!
//! ```no_run
//! use follow_storage::{MappedRegion, WritableMap};
//! use std::path::Path;
//!
//! let mut map = WritableMap::open(Path::new("seg-000001.dat"), 4096).unwrap();
//! map.write_at(0, b"hello world").unwrap();
//! map.flush_range(0, 11).unwrap();
//! assert_eq!(&map.as_bytes()[..11], b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod readonly;
mod region;
mod snapshot;
mod writable;

pub use error::{StorageError, StorageResult};
pub use readonly::ReadOnlyMap;
pub use region::MappedRegion;
pub use snapshot::FileSnapshot;
pub use writable::WritableMap;
