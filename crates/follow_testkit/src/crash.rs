//! Crash recovery testing for follow.
//!
//! This module reproduces the on-disk states a crash can leave behind and
//! verifies that the queue reopens correctly from them.
//!
//! ## Test Strategy
//!
//! 1. **Crash after append** - Flushed messages survive
//! 2. **Crash mid-rotation** - The old segment was trimmed but no successor
//!    exists yet
//! 3. **Crash after creating a segment** - An empty successor exists next to
//!    an untrimmed predecessor
//! 4. **Torn append** - A half-written record is reported, never skipped
//!
//! ## Usage
//!
//! ```rust,ignore
//! use follow_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! assert!(harness.test_crash_mid_rotation().passed);
//! ```

use crate::fixtures::{read_all, SMALL_SEGMENT_SIZE};
use follow_core::dir::segment_file_name;
use follow_core::{CoreError, CoreResult, MessageId, Queue};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected messages after recovery.
    pub expected_messages: usize,
    /// Actual messages after recovery.
    pub actual_messages: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, messages: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_messages: messages,
            actual_messages: messages,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_messages: expected,
            actual_messages: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Test harness for crash recovery scenarios.
///
/// Every scenario starts from an empty queue directory with small segments
/// (two messages per segment) and a budget of ten segments.
pub struct CrashRecoveryHarness {
    temp_dir: TempDir,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new harness with a temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            results: Vec::new(),
        }
    }

    /// Returns the queue directory.
    pub fn queue_path(&self) -> PathBuf {
        self.temp_dir.path().join("queue")
    }

    fn segment_path(&self, sequence: u64) -> PathBuf {
        self.queue_path().join(segment_file_name(sequence))
    }

    fn open(&self) -> CoreResult<Queue> {
        Queue::open(&self.queue_path(), SMALL_SEGMENT_SIZE, 10)
    }

    /// Opens a fresh queue, appends `count` messages and closes it again,
    /// as a crash right after the last append would.
    fn populate(&self, count: u8) -> CoreResult<Vec<MessageId>> {
        let _ = std::fs::remove_dir_all(self.queue_path());
        let queue = self.open()?;
        let ids = (0..count)
            .map(|n| queue.append("crash", &[n; 6]))
            .collect::<CoreResult<Vec<_>>>()?;
        queue.close()?;
        Ok(ids)
    }

    /// Reopens the queue and checks that it returns `expected` in order and
    /// still accepts appends.
    fn check_recovered(&self, description: &str, expected: &[MessageId]) -> CrashRecoveryResult {
        let result = (|| {
            let queue = self.open()?;
            let read: Vec<_> = read_all(&queue).into_iter().map(|m| m.id).collect();
            if read != expected {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    expected.len(),
                    read.len(),
                    "recovered messages differ from the appended ones",
                ));
            }

            let next = queue.append("crash", b"after")?;
            if expected.last().is_some_and(|last| next <= *last) {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    expected.len(),
                    read.len(),
                    "identifier after recovery does not increase",
                ));
            }
            queue.close()?;
            Ok(CrashRecoveryResult::pass(description, expected.len()))
        })();

        result.unwrap_or_else(|e: CoreError| {
            CrashRecoveryResult::fail(description, expected.len(), 0, &e.to_string())
        })
    }

    fn record(&mut self, result: CrashRecoveryResult) -> CrashRecoveryResult {
        self.results.push(result.clone());
        result
    }

    /// Tests that flushed messages survive a crash.
    pub fn test_appended_data_survives(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Appended messages survive crash";
        let result = match self.populate(5) {
            Ok(ids) => self.check_recovered(DESCRIPTION, &ids),
            Err(e) => CrashRecoveryResult::fail(DESCRIPTION, 5, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// Tests recovery when the full segment was trimmed but its successor
    /// was never created.
    pub fn test_crash_mid_rotation(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Crash between sealing and creating a segment";
        let result = (|| {
            // Two messages fill the first segment; the third would rotate.
            let ids = self.populate(2)?;
            let record_bytes = 2 * (29 + 5 + 6);
            std::fs::OpenOptions::new()
                .write(true)
                .open(self.segment_path(1))?
                .set_len(record_bytes)?;
            Ok(self.check_recovered(DESCRIPTION, &ids))
        })();
        let result = result.unwrap_or_else(|e: CoreError| {
            CrashRecoveryResult::fail(DESCRIPTION, 2, 0, &e.to_string())
        });
        self.record(result)
    }

    /// Tests recovery when a successor exists but the previous active
    /// segment was never trimmed.
    pub fn test_crash_after_segment_created(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Crash after creating a segment, before trimming";
        let result = (|| {
            let ids = self.populate(3)?;
            // Segment 2 is active and untrimmed; segment 3 appears empty.
            std::fs::File::create(self.segment_path(3))?;
            Ok(self.check_recovered(DESCRIPTION, &ids))
        })();
        let result = result.unwrap_or_else(|e: CoreError| {
            CrashRecoveryResult::fail(DESCRIPTION, 3, 0, &e.to_string())
        });
        self.record(result)
    }

    /// Tests that a half-written record at the end of the active segment is
    /// reported as corruption rather than silently dropped.
    pub fn test_torn_append_is_detected(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Torn append is detected";
        let result = (|| {
            self.populate(1)?;
            let used = 29 + 5 + 6;
            write_at(&self.segment_path(1), used, &[0x01; 20])?;

            match self.open() {
                Err(e) if e.is_corruption() => Ok(CrashRecoveryResult::pass(DESCRIPTION, 1)),
                Err(e) => Ok(CrashRecoveryResult::fail(
                    DESCRIPTION,
                    1,
                    0,
                    &format!("unexpected error: {e}"),
                )),
                Ok(queue) => {
                    let found = read_all(&queue).len();
                    Ok(CrashRecoveryResult::fail(
                        DESCRIPTION,
                        1,
                        found,
                        "queue opened over a torn record",
                    ))
                }
            }
        })();
        let result = result.unwrap_or_else(|e: CoreError| {
            CrashRecoveryResult::fail(DESCRIPTION, 1, 0, &e.to_string())
        });
        self.record(result)
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> &[CrashRecoveryResult] {
        self.test_appended_data_survives();
        self.test_crash_mid_rotation();
        self.test_crash_after_segment_created();
        self.test_torn_append_is_detected();
        &self.results
    }

    /// Returns `true` if every recorded scenario passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

impl Default for CrashRecoveryHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn write_at(path: &Path, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appended_data_survives() {
        let mut harness = CrashRecoveryHarness::new();
        let result = harness.test_appended_data_survives();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_crash_mid_rotation() {
        let mut harness = CrashRecoveryHarness::new();
        let result = harness.test_crash_mid_rotation();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_crash_after_segment_created() {
        let mut harness = CrashRecoveryHarness::new();
        let result = harness.test_crash_after_segment_created();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_torn_append_is_detected() {
        let mut harness = CrashRecoveryHarness::new();
        let result = harness.test_torn_append_is_detected();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_run_all() {
        let mut harness = CrashRecoveryHarness::new();
        assert_eq!(harness.run_all().len(), 4);
        assert!(harness.all_passed());
    }
}
