//! Inspect command implementation.

use super::format_size;
use follow_core::{MessageId, QueueReader, SegmentInfo, SegmentRole};
use serde::Serialize;
use std::path::Path;

/// Queue inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Queue path.
    pub path: String,
    /// Number of segment files.
    pub segment_count: usize,
    /// Number of stored messages.
    pub message_count: usize,
    /// Bytes holding records, over all segments.
    pub bytes_used: u64,
    /// Newest stored identifier.
    pub last_id: Option<MessageId>,
    /// Per-segment statistics, oldest first.
    pub segments: Vec<SegmentInfo>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No queue found at {:?}", path).into());
    }

    let reader = QueueReader::open(path)?;
    let segments = reader.segments();

    let result = InspectResult {
        path: path.display().to_string(),
        segment_count: segments.len(),
        message_count: segments.iter().map(|s| s.message_count).sum(),
        bytes_used: segments.iter().map(|s| s.bytes_used as u64).sum(),
        last_id: reader.last_id(),
        segments,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("follow Queue Inspection");
    println!("=======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Segments: {}", result.segment_count);
    println!("Messages: {}", result.message_count);
    println!("Used:     {}", format_size(result.bytes_used));
    if let Some(last) = result.last_id {
        println!("Last id:  {last}");
    }

    if result.segments.is_empty() {
        return;
    }

    println!();
    println!(
        "  {:>8}  {:<8}  {:>9}  {:>10}  {:<36}  {:<36}",
        "SEQ", "ROLE", "MESSAGES", "USED", "FIRST ID", "LAST ID"
    );
    for segment in &result.segments {
        let role = match segment.role {
            SegmentRole::Active => "active",
            SegmentRole::Archived => "archived",
        };
        println!(
            "  {:>8}  {:<8}  {:>9}  {:>10}  {:<36}  {:<36}",
            segment.sequence,
            role,
            segment.message_count,
            format_size(segment.bytes_used as u64),
            display_id(segment.first_id),
            display_id(segment.last_id),
        );
    }
}

fn display_id(id: Option<MessageId>) -> String {
    id.map_or_else(|| "-".to_string(), |id| id.to_string())
}
