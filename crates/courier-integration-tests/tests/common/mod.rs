//! Common test utilities for courier integration tests
//!
//! This module provides:
//! - A messenger fixture over a fresh in-memory backend
//! - An error sink that records everything reported to it
//! - Bounded polling helpers for consumer-driven assertions

use courier_core::{ErrorSink, Messenger, MessengerConfig, MessengerError, SharedErrorSink};
use courier_runtime::{InMemoryBackend, Locator, SharedBackend};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Collecting Error Sink
// ============================================================================

/// Error sink recording the display form of every reported error
#[derive(Default)]
#[allow(dead_code)]
pub struct CollectingSink {
    reported: Mutex<Vec<String>>,
}

impl CollectingSink {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any reported error contains `needle`
    #[allow(dead_code)]
    pub fn contains(&self, needle: &str) -> bool {
        self.reported
            .lock()
            .unwrap()
            .iter()
            .any(|entry| entry.contains(needle))
    }

    #[allow(dead_code)]
    pub fn reported(&self) -> Vec<String> {
        self.reported.lock().unwrap().clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, error: &MessengerError) {
        self.reported.lock().unwrap().push(error.to_string());
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Configuration with the prefixes a deployment would set
#[allow(dead_code)]
pub fn test_config() -> MessengerConfig {
    MessengerConfig::new()
        .with_resource_name_prefix("svc-")
        .with_queue_arn_prefix("arn:sqs:local:")
        .with_topic_arn_prefix("arn:sns:local:")
        .with_queue_locator_prefix("https://queue.local/")
}

/// Create a messenger over a fresh in-memory backend
#[allow(dead_code)]
pub fn memory_messenger() -> (Arc<InMemoryBackend>, Messenger) {
    let backend = Arc::new(InMemoryBackend::new());
    let messenger = Messenger::new(Arc::clone(&backend) as SharedBackend, test_config());
    (backend, messenger)
}

/// Create a messenger whose consumer-side errors land in a [`CollectingSink`]
#[allow(dead_code)]
pub fn memory_messenger_with_sink() -> (Arc<InMemoryBackend>, Arc<CollectingSink>, Messenger) {
    let backend = Arc::new(InMemoryBackend::new());
    let sink = Arc::new(CollectingSink::new());
    let messenger = Messenger::new(Arc::clone(&backend) as SharedBackend, test_config())
        .with_error_sink(Arc::clone(&sink) as SharedErrorSink);
    (backend, sink, messenger)
}

// ============================================================================
// Polling Helpers
// ============================================================================

/// Poll `condition` every 10ms until it holds, panicking once `limit` passes
#[allow(dead_code)]
pub async fn wait_until<F>(limit: Duration, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the queue at `locator` holds no visible or in-flight messages
#[allow(dead_code)]
pub async fn wait_until_drained(backend: &InMemoryBackend, locator: &Locator) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = backend.queue_stats(locator).await.unwrap();
        if stats.visible == 0 && stats.in_flight == 0 {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "queue {locator} still holds messages"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
