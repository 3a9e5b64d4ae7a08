//! Stress tests for follow.
//!
//! These tests verify behavior under heavy load and concurrent access.

use follow_core::{MessageId, Queue};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of appends to perform, over all producers.
    pub operations: usize,
    /// Number of concurrent producer threads.
    pub threads: usize,
    /// Size of each message body in bytes.
    pub body_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            body_size: 256,
        }
    }
}

/// Run a sequential append stress test.
pub fn stress_sequential_appends(queue: &Queue, config: &StressConfig) -> StressTestResult {
    let body = vec![0xABu8; config.body_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for _ in 0..config.operations {
        match queue.append("stress", &body) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a sequential read stress test over everything retained.
pub fn stress_sequential_reads(queue: &Queue) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut cursor = MessageId::ZERO;

    loop {
        match queue.next_after(&cursor) {
            Ok(Some(message)) => {
                successful += 1;
                cursor = message.id;
            }
            Ok(None) => break,
            Err(_) => {
                failed += 1;
                break;
            }
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent producers against one consumer.
///
/// The consumer counts a failure for every message that does not come
/// strictly after the one before it. It stops once the producers are done
/// and it has caught up.
pub fn stress_concurrent_producers(queue: Arc<Queue>, config: &StressConfig) -> StressTestResult {
    let appended = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let producing = Arc::new(AtomicBool::new(true));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let consumer = {
        let queue = Arc::clone(&queue);
        let failed = Arc::clone(&failed);
        let producing = Arc::clone(&producing);
        thread::spawn(move || {
            let mut cursor = MessageId::ZERO;
            let mut consumed = 0usize;
            loop {
                // Read the flag before polling so nothing appended before it
                // was cleared can be missed.
                let done = !producing.load(Ordering::SeqCst);
                match queue.next_after(&cursor) {
                    Ok(Some(message)) => {
                        if message.id <= cursor {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        cursor = message.id;
                        consumed += 1;
                    }
                    Ok(None) if done => break,
                    Ok(None) => thread::yield_now(),
                    Err(_) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }
            consumed
        })
    };

    let producers: Vec<_> = (0..config.threads)
        .map(|t| {
            let queue = Arc::clone(&queue);
            let appended = Arc::clone(&appended);
            let failed = Arc::clone(&failed);
            let body = vec![t as u8; config.body_size];

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    match queue.append("stress", &body) {
                        Ok(_) => {
                            appended.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in producers {
        handle.join().expect("Thread panicked");
    }
    producing.store(false, Ordering::SeqCst);
    let consumed = consumer.join().expect("Thread panicked");

    let appended = appended.load(Ordering::Relaxed);
    let mut failed = failed.load(Ordering::Relaxed);
    if consumed != appended {
        failed += appended.abs_diff(consumed);
    }

    StressTestResult::new(appended, failed, start.elapsed())
}
