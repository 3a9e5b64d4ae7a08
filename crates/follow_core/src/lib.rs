//! # Follow Core
//!
//! Durable, segmented, append-only message log.
//!
//! This crate provides:
//! - Message identifiers and a time-ordered identifier generator
//! - The checksummed record format
//! - Active (writable, memory-mapped) and archived (sealed, read-only) segments
//! - The queue that rotates, evicts and searches segments
//! - A lock-free reader for tools that watch a queue from another process
//!
//! ## Example
//!
//! ```no_run
//! use follow_core::{MessageId, Queue, QueueConfig};
//!
//! let config = QueueConfig::new().segment_size(1024 * 1024).max_segments(8);
//! let queue = Queue::open_with_config("/tmp/follow".as_ref(), config)?;
//!
//! queue.append("order.placed", b"42")?;
//!
//! let mut cursor = MessageId::ZERO;
//! while let Some(message) = queue.next_after(&cursor)? {
//!     println!("{} {}", message.id, message.kind);
//!     cursor = message.id;
//! }
//! # Ok::<(), follow_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod config;
pub mod dir;
mod error;
mod id;
mod queue;
mod reader;
pub mod segment;

pub use codec::{
    ChecksumKey, Message, MessageView, DEFAULT_CHECKSUM_KEY, MAX_BODY_LEN, MAX_TYPE_LEN,
    RECORD_OVERHEAD,
};
pub use config::QueueConfig;
pub use dir::QueueDir;
pub use error::{CoreError, CoreResult};
pub use id::{IdGenerator, MessageId, ID_LEN};
pub use queue::{Queue, SegmentInfo, SegmentRole};
pub use reader::QueueReader;
pub use segment::{
    ActiveSegment, ArchivedSegment, IndexEntry, Segment, SegmentIndex, StoreOutcome,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
