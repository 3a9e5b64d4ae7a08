//! follow CLI
//!
//! Command-line tools for follow message queues.
//!
//! # Commands
//!
//! - `append` - Append one message
//! - `tail` - Print messages, optionally waiting for new ones
//! - `inspect` - Display per-segment statistics
//! - `verify` - Check every record of every segment

mod commands;

use clap::{Parser, Subcommand};
use commands::QueueSettings;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// follow command-line queue tools.
#[derive(Parser)]
#[command(name = "follow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Segment capacity in bytes (default: size of the existing segments)
    #[arg(global = true, long)]
    segment_size: Option<u64>,

    /// Maximum number of segments to keep
    #[arg(global = true, long)]
    max_segments: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a message and print its identifier
    Append {
        /// Message type tag
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Message body
        #[arg(short, long, conflicts_with = "file")]
        body: Option<String>,

        /// Read the message body from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print messages in append order
    Tail {
        /// Start after this message identifier
        #[arg(short, long)]
        after: Option<String>,

        /// Stop after printing this many messages
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Keep polling for new messages
        #[arg(short, long)]
        follow: bool,

        /// Polling interval in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Display per-segment statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify queue integrity
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = QueueSettings {
        segment_size: cli.segment_size,
        max_segments: cli.max_segments,
    };

    match cli.command {
        Commands::Append { kind, body, file } => {
            let path = cli.path.ok_or("Queue path required for append")?;
            let body = match (body, file) {
                (Some(body), None) => body.into_bytes(),
                (None, Some(file)) => std::fs::read(&file)
                    .map_err(|e| format!("could not read {}: {e}", file.display()))?,
                _ => return Err("Exactly one of --body or --file is required".into()),
            };
            commands::append::run(&path, &settings, &kind, &body)?;
        }
        Commands::Tail {
            after,
            limit,
            follow,
            interval_ms,
            format,
        } => {
            let path = cli.path.ok_or("Queue path required for tail")?;
            commands::tail::run(
                &path,
                after.as_deref(),
                limit,
                follow.then(|| Duration::from_millis(interval_ms)),
                &format,
            )?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Queue path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Queue path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("follow CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("follow core v{}", follow_core::VERSION);
        }
    }

    Ok(())
}
