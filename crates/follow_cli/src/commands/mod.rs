//! CLI command implementations.

pub mod append;
pub mod inspect;
pub mod tail;
pub mod verify;

use follow_core::{dir, QueueConfig, RECORD_OVERHEAD};
use std::path::Path;

/// Queue settings given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSettings {
    /// Segment capacity in bytes.
    pub segment_size: Option<u64>,
    /// Maximum number of retained segments.
    pub max_segments: Option<usize>,
}

impl QueueSettings {
    /// Builds the configuration for opening the queue at `path`.
    ///
    /// Settings not given on the command line are taken from the existing
    /// queue so that opening it neither resizes the active segment nor
    /// evicts anything: the segment size is the largest segment file, and
    /// the segment budget is never below the current segment count.
    pub fn config_for(&self, path: &Path) -> std::io::Result<QueueConfig> {
        let mut config = QueueConfig::new();
        let existing = existing_segments(path)?;

        match self.segment_size {
            Some(size) => config = config.segment_size(size),
            None => {
                if let Some(size) = existing
                    .iter()
                    .map(|(_, len)| *len)
                    .max()
                    .filter(|len| *len >= RECORD_OVERHEAD as u64)
                {
                    config = config.segment_size(size);
                }
            }
        }

        let max_segments = self
            .max_segments
            .unwrap_or_else(|| config.max_segments.max(existing.len()));
        Ok(config.max_segments(max_segments))
    }
}

/// Lists (sequence, file length) for the segments under `path`.
fn existing_segments(path: &Path) -> std::io::Result<Vec<(u64, u64)>> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let sequences = dir::list_segments(path).map_err(std::io::Error::other)?;
    sequences
        .into_iter()
        .map(|sequence| {
            let len = std::fs::metadata(path.join(dir::segment_file_name(sequence)))?.len();
            Ok((sequence, len))
        })
        .collect()
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use follow_core::Queue;
    use tempfile::tempdir;

    #[test]
    fn new_queue_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = QueueSettings::default()
            .config_for(&dir.path().join("new"))
            .unwrap();

        assert_eq!(config.segment_size, QueueConfig::default().segment_size);
        assert_eq!(config.max_segments, QueueConfig::default().max_segments);
    }

    #[test]
    fn existing_queue_settings_are_kept() {
        let dir = tempdir().unwrap();
        {
            let queue = Queue::open(dir.path(), 100, 40).unwrap();
            for n in 0..40u8 {
                queue.append("t", &[n; 10]).unwrap();
            }
            queue.close().unwrap();
        }

        let config = QueueSettings::default().config_for(dir.path()).unwrap();
        assert_eq!(config.segment_size, 100);
        assert_eq!(config.max_segments, 20);

        let explicit = QueueSettings {
            segment_size: Some(4096),
            max_segments: Some(3),
        }
        .config_for(dir.path())
        .unwrap();
        assert_eq!(explicit.segment_size, 4096);
        assert_eq!(explicit.max_segments, 3);
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(64 * 1024 * 1024), "64.0 MB");
    }
}
