//! Verify command implementation.

use follow_core::dir::{list_segments, segment_file_name};
use follow_core::{ArchivedSegment, QueueReader, DEFAULT_CHECKSUM_KEY};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segment files checked.
    pub segments_checked: usize,
    /// Number of segments whose every record verified.
    pub valid_segments: usize,
    /// Number of messages in valid segments.
    pub messages: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
///
/// Every segment is read and its index rebuilt independently, so one
/// corrupt segment does not hide problems in the others. The queue lock is
/// not taken; segments are only read.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying queue at {:?}", path);
    println!();

    let result = verify(path)?;

    println!(
        "  Segments checked: {}, valid: {}, messages: {}",
        result.segments_checked, result.valid_segments, result.messages
    );
    for error in &result.errors {
        println!("    ERROR: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Queue verification passed");
        Ok(())
    } else {
        println!("✗ Queue verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every segment under `path`, then the order across segments.
pub fn verify(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();

    for sequence in list_segments(path)? {
        result.segments_checked += 1;
        let segment_path = path.join(segment_file_name(sequence));

        match ArchivedSegment::snapshot(&segment_path, DEFAULT_CHECKSUM_KEY) {
            Ok(segment) => {
                result.valid_segments += 1;
                result.messages += segment.message_count();
                println!(
                    "  {}: {} messages, {} of {} bytes used",
                    segment_file_name(sequence),
                    segment.message_count(),
                    segment.used(),
                    segment.size()
                );
            }
            Err(err) => result.errors.push(err.to_string()),
        }
    }

    if result.is_ok() {
        if let Err(err) = QueueReader::open(path) {
            result.errors.push(err.to_string());
        }
    }

    Ok(result)
}
