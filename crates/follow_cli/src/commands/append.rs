//! Append command implementation.

use super::QueueSettings;
use follow_core::Queue;
use std::path::Path;

/// Runs the append command.
pub fn run(
    path: &Path,
    settings: &QueueSettings,
    kind: &str,
    body: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.config_for(path)?;
    let queue = Queue::open_with_config(path, config)?;

    let appended = queue.append(kind, body);
    let closed = queue.close();
    let id = appended?;
    closed?;

    println!("{id}");
    Ok(())
}
