//! Tail command implementation.

use follow_core::{Message, MessageId, QueueReader};
use serde::Serialize;
use std::borrow::Cow;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// One message as printed in JSON output.
#[derive(Debug, Serialize)]
struct TailRecord<'a> {
    id: MessageId,
    #[serde(rename = "type")]
    kind: &'a str,
    body: Cow<'a, str>,
}

/// Runs the tail command.
///
/// With `follow` set, the queue is polled at the given interval once every
/// stored message has been printed; otherwise the command returns.
pub fn run(
    path: &Path,
    after: Option<&str>,
    limit: Option<usize>,
    follow: Option<Duration>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut cursor = match after {
        Some(id) => id.parse()?,
        None => MessageId::ZERO,
    };
    let mut reader = QueueReader::open(path)?;
    let mut printed = 0usize;

    loop {
        while limit.is_none_or(|limit| printed < limit) {
            let Some(message) = reader.next_after(&cursor)? else {
                break;
            };
            print_message(&message, format)?;
            cursor = message.id;
            printed += 1;
        }

        let Some(interval) = follow else {
            break;
        };
        if limit.is_some_and(|limit| printed >= limit) {
            break;
        }

        thread::sleep(interval);
        if let Err(err) = reader.refresh() {
            warn!(error = %err, "could not refresh queue view, retrying");
        }
    }

    Ok(())
}

fn print_message(message: &Message, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let body = String::from_utf8_lossy(&message.body);
    match format {
        "json" => {
            let record = TailRecord {
                id: message.id,
                kind: &message.kind,
                body,
            };
            println!("{}", serde_json::to_string(&record)?);
        }
        _ => {
            println!("{}\t{}\t{}", message.id, message.kind, body);
        }
    }
    Ok(())
}
