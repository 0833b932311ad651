//! Message types, receipt handles, and send/receive options.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier assigned to a message by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token tied to one delivery of one message.
///
/// Acknowledging a message requires the receipt from its most recent
/// delivery; earlier receipts are invalidated when the message is
/// redelivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle with validation
    pub fn new(handle: String) -> Result<Self, ValidationError> {
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }

        Ok(Self(handle))
    }

    /// Get handle as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReceiptHandle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message received from a queue with processing metadata.
///
/// Received messages are ephemeral: the receipt handle is only valid while
/// the message stays invisible, and none of this state survives redelivery.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub body: String,
    /// Number of deliveries of this message so far, including this one
    pub receive_count: u32,
}

/// Result of sending or publishing a single message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: MessageId,
}

// ============================================================================
// Send and Receive Options
// ============================================================================

/// Configuration options for sending messages to queues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Delivery delay in seconds, overriding the queue default
    pub delay_seconds: Option<u32>,
    /// Priority hint for backends that support prioritized delivery
    pub priority: Option<u8>,
}

impl SendOptions {
    /// Create new send options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set delivery delay in seconds
    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    /// Set priority hint
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Configuration options for receiving messages from queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to receive in a batch
    pub max_messages: u32,
    /// Long-poll wait in seconds before returning an empty batch
    pub wait_seconds: u32,
    /// Visibility timeout for this receive, overriding the queue default
    pub visibility_timeout: Option<u32>,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait_seconds: 0,
            visibility_timeout: None,
        }
    }
}

impl ReceiveOptions {
    /// Create new receive options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of messages to receive
    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = max;
        self
    }

    /// Set long-poll wait in seconds
    pub fn with_wait_seconds(mut self, seconds: u32) -> Self {
        self.wait_seconds = seconds;
        self
    }

    /// Set visibility timeout in seconds for this receive
    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }
}

// ============================================================================
// Batch Entries
// ============================================================================

/// One message in a batched send.
///
/// Entry ids are caller-chosen and only need to be unique within the batch;
/// the backend reports per-entry outcomes against them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendBatchEntry {
    pub id: String,
    pub body: String,
}

impl SendBatchEntry {
    /// Create new batch entry
    pub fn new(id: String, body: String) -> Self {
        Self { id, body }
    }
}

/// One acknowledgement in a batched delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBatchEntry {
    pub id: String,
    pub receipt_handle: ReceiptHandle,
}

impl DeleteBatchEntry {
    /// Create new batch entry
    pub fn new(id: String, receipt_handle: ReceiptHandle) -> Self {
        Self { id, receipt_handle }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
