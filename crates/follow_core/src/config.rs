//! Queue configuration.

use crate::codec::{ChecksumKey, DEFAULT_CHECKSUM_KEY, RECORD_OVERHEAD};
use crate::error::{CoreError, CoreResult};

/// Configuration for opening a queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Capacity of every segment file in bytes.
    ///
    /// Fixed for the lifetime of a queue directory: reopening with a smaller
    /// value than an existing active segment is rejected.
    pub segment_size: u64,

    /// Maximum number of segments kept on disk, the active one included.
    pub max_segments: usize,

    /// Whether to create the queue directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Key for record checksums.
    pub checksum_key: ChecksumKey,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            segment_size: 64 * 1024 * 1024, // 64 MB
            max_segments: 16,
            create_if_missing: true,
            checksum_key: DEFAULT_CHECKSUM_KEY,
        }
    }
}

impl QueueConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment capacity.
    #[must_use]
    pub const fn segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the maximum number of retained segments.
    #[must_use]
    pub const fn max_segments(mut self, count: usize) -> Self {
        self.max_segments = count;
        self
    }

    /// Sets whether to create the queue directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the checksum key.
    #[must_use]
    pub const fn checksum_key(mut self, key: ChecksumKey) -> Self {
        self.checksum_key = key;
        self
    }

    /// Checks the configuration for values no queue can work with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if fewer than one segment is allowed, or if a
    /// segment cannot hold even an empty message or cannot be mapped.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_segments == 0 {
            return Err(CoreError::invalid_config(
                "max_segments must be at least 1",
            ));
        }
        if self.segment_size < RECORD_OVERHEAD as u64 {
            return Err(CoreError::invalid_config(format!(
                "segment_size {} cannot hold a single message (minimum {RECORD_OVERHEAD})",
                self.segment_size
            )));
        }
        if usize::try_from(self.segment_size).is_err() {
            return Err(CoreError::invalid_config(format!(
                "segment_size {} is not addressable on this platform",
                self.segment_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = QueueConfig::default();
        assert!(config.create_if_missing);
        assert_eq!(config.max_segments, 16);
        assert_eq!(config.checksum_key, DEFAULT_CHECKSUM_KEY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = QueueConfig::new()
            .segment_size(4096)
            .max_segments(3)
            .create_if_missing(false);

        assert_eq!(config.segment_size, 4096);
        assert_eq!(config.max_segments, 3);
        assert!(!config.create_if_missing);
    }

    #[test]
    fn validate_rejects_unusable_values() {
        assert!(QueueConfig::new().max_segments(0).validate().is_err());
        assert!(QueueConfig::new().segment_size(28).validate().is_err());
        assert!(QueueConfig::new()
            .segment_size(29)
            .max_segments(1)
            .validate()
            .is_ok());
    }
}
