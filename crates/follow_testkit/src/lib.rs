//! # follow Testkit
//!
//! Test utilities for follow.
//!
//! This crate provides:
//! - Temporary queue fixtures
//! - Property-based test generators using proptest
//! - A tracking harness for end-to-end queue scenarios
//! - Crash recovery scenarios
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use follow_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_queue() {
//!     with_temp_queue(|queue| {
//!         queue.append("event", b"payload").unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
