//! Stress tests for the DDP client.
//!
//! These drive one connection from many threads at once: callers registering
//! calls and subscriptions while other threads deliver server frames.

use crate::fixtures;
use crate::harness::TestClient;
use ddp_protocol::ClientMessage;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Operations whose outcome matched expectations.
    pub successful_ops: usize,
    /// Operations whose outcome did not.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 500,
            threads: 4,
        }
    }
}

/// Registers calls from many threads, then answers them from many threads
/// with `updated` and `result` racing each other.
///
/// An operation succeeds when its call ends with the expected result and
/// no longer registered.
pub fn stress_concurrent_calls(config: &StressConfig) -> StressTestResult {
    let client = Arc::new(TestClient::connected());
    let start = Instant::now();

    let callers: Vec<_> = (0..config.threads)
        .map(|_| {
            let client = Arc::clone(&client);
            let operations = config.operations;
            thread::spawn(move || {
                (0..operations)
                    .map(|i| client.connection.call("echo", vec![serde_json::json!(i)]))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let calls: Vec<_> = callers
        .into_iter()
        .flat_map(|h| h.join().expect("caller thread panicked"))
        .collect();

    let ids: Vec<String> = client
        .take_sent()
        .into_iter()
        .filter_map(|message| match message {
            ClientMessage::Method { id, .. } => Some(id),
            _ => None,
        })
        .collect();

    let result_thread = {
        let client = Arc::clone(&client);
        let ids = ids.clone();
        thread::spawn(move || {
            for id in &ids {
                client.deliver(fixtures::result_ok(id, serde_json::json!(id)));
            }
        })
    };
    let updated_thread = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            for chunk in ids.chunks(16) {
                let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
                client.deliver(fixtures::updated(&refs));
            }
        })
    };
    result_thread.join().expect("result thread panicked");
    updated_thread.join().expect("updated thread panicked");

    let mut successful = 0;
    let mut failed = 0;
    for call in &calls {
        let ok = call.is_complete() && call.result() == serde_json::json!(call.id());
        if ok {
            successful += 1;
        } else {
            failed += 1;
        }
    }
    if !client.connection.pending_calls().is_empty() {
        failed += client.connection.pending_calls().len();
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Subscribes from many threads while another thread streams documents and
/// marks subscriptions ready.
///
/// An operation succeeds when its subscription is ready and active.
pub fn stress_subscriptions_with_data(config: &StressConfig) -> StressTestResult {
    let client = Arc::new(TestClient::connected());
    let start = Instant::now();

    let feeder = {
        let client = Arc::clone(&client);
        let documents = config.operations;
        thread::spawn(move || {
            for i in 0..documents {
                client.deliver(fixtures::added(
                    "stress",
                    &i.to_string(),
                    serde_json::json!({"n": i}),
                ));
            }
        })
    };

    let subscribers: Vec<_> = (0..config.threads)
        .map(|t| {
            let client = Arc::clone(&client);
            let operations = config.operations;
            thread::spawn(move || {
                (0..operations)
                    .map(|i| {
                        client
                            .connection
                            .subscribe("stress", vec![serde_json::json!([t, i])])
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let subscriptions: Vec<_> = subscribers
        .into_iter()
        .flat_map(|h| h.join().expect("subscriber thread panicked"))
        .collect();
    feeder.join().expect("feeder thread panicked");

    let ids: Vec<String> = subscriptions.iter().map(|s| s.id()).collect();
    for chunk in ids.chunks(32) {
        let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
        client.deliver(fixtures::ready(&refs));
    }

    let mut successful = 0;
    let mut failed = 0;
    for subscription in &subscriptions {
        if subscription.is_ready() && subscription.is_active() {
            successful += 1;
        } else {
            failed += 1;
        }
    }
    if client.documents("stress").len() != config.operations {
        failed += 1;
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            operations: 50,
            threads: 4,
        }
    }

    #[test]
    fn concurrent_calls_all_complete() {
        let result = stress_concurrent_calls(&small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
    }

    #[test]
    fn concurrent_subscriptions_all_ready() {
        let result = stress_subscriptions_with_data(&small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.total_ops, 200);
    }
}
