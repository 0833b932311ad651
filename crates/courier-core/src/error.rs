//! Error types and the error sink for consumer-path failures.

use courier_runtime::BackendError;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by messenger orchestration and consumer processing
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("Queue not registered: {name}")]
    QueueNotFound { name: String },

    #[error("Topic not registered: {name}")]
    TopicNotFound { name: String },

    #[error("Declaration of '{resource}' failed: {reason}")]
    Declaration { resource: String, reason: String },

    #[error("Resource '{resource}' not ready after {waited_ms}ms")]
    ResourceNotReady { resource: String, waited_ms: u64 },

    #[error("Consumer[{queue}] receive error: {source}")]
    Receive {
        queue: String,
        #[source]
        source: BackendError,
    },

    #[error("Consumer[{queue}] receiving halted after {failures} consecutive failures")]
    ReceiveHalted { queue: String, failures: u32 },

    #[error("Consumer[{queue}] handler error: {reason}")]
    Handler { queue: String, reason: String },

    #[error("Consumer[{queue}] handler error: operation timed out after {timeout_secs}s")]
    HandlerTimeout { queue: String, timeout_secs: u32 },

    #[error("Consumer[{queue}] acknowledge error: {source}")]
    Ack {
        queue: String,
        #[source]
        source: BackendError,
    },

    #[error("Consumer[{queue}] dead-letter redirect failed: {source}")]
    DeadLetterRedirect {
        queue: String,
        #[source]
        source: BackendError,
    },

    #[error("Consumer[{queue}] still processing after {timeout_ms}ms shutdown timeout")]
    ShutdownTimeout { queue: String, timeout_ms: u64 },

    #[error("Payload must encode to a JSON object, got {kind}")]
    PayloadNotObject { kind: String },

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend operation failed: {0}")]
    Backend(#[from] BackendError),
}

impl MessengerError {
    /// The queue a consumer-scoped error belongs to, if any
    pub fn queue(&self) -> Option<&str> {
        match self {
            Self::Receive { queue, .. }
            | Self::ReceiveHalted { queue, .. }
            | Self::Handler { queue, .. }
            | Self::HandlerTimeout { queue, .. }
            | Self::Ack { queue, .. }
            | Self::DeadLetterRedirect { queue, .. }
            | Self::ShutdownTimeout { queue, .. } => Some(queue),
            _ => None,
        }
    }
}

/// Shared handle to an error sink
pub type SharedErrorSink = Arc<dyn ErrorSink>;

/// Receives failures from consumer poll loops and other background tasks.
///
/// Background work has no caller to return errors to, so everything that
/// fails after setup flows through here. Implementations must not block.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &MessengerError);
}

/// Default sink that logs every reported error
#[derive(Debug, Clone, Default)]
pub struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn report(&self, error: &MessengerError) {
        match error.queue() {
            Some(queue) => tracing::error!(queue = %queue, error = %error, "consumer error"),
            None => tracing::error!(error = %error, "messenger error"),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
