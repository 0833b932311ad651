//! The backend trait implemented by messaging providers.

use crate::error::BackendError;
use crate::message::{
    DeleteBatchEntry, ReceiveOptions, ReceivedMessage, SendBatchEntry, SendOptions, SentMessage,
};
use crate::resource::{CreatedResource, Locator, QueueAttributes, SubscriptionRef};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

/// Shared handle to a backend implementation
pub type SharedBackend = Arc<dyn QueueBackend>;

/// Capability surface of an SQS/SNS-shaped messaging backend.
///
/// Implementations must be safe to share across tasks; every operation takes
/// `&self`. Message bodies cross this boundary as strings since the
/// orchestration layer encodes all payloads as JSON text.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Create a queue with the given attributes.
    ///
    /// Creating a queue that already exists with identical attributes is
    /// idempotent and returns the existing locator. A name collision with
    /// different attributes fails with [`BackendError::AlreadyExists`].
    async fn create_queue(
        &self,
        name: &str,
        attributes: QueueAttributes,
    ) -> Result<CreatedResource, BackendError>;

    /// Send a single message to a queue
    async fn send_message(
        &self,
        locator: &Locator,
        body: String,
        options: SendOptions,
    ) -> Result<SentMessage, BackendError>;

    /// Send multiple messages to a queue in one call
    async fn send_message_batch(
        &self,
        locator: &Locator,
        entries: Vec<SendBatchEntry>,
    ) -> Result<(), BackendError>;

    /// Receive a batch of messages, long-polling up to
    /// [`ReceiveOptions::wait_seconds`] when the queue is empty.
    ///
    /// An empty vector is a normal outcome, not an error.
    async fn receive_message_batch(
        &self,
        locator: &Locator,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, BackendError>;

    /// Acknowledge one message, removing it permanently
    async fn delete_message(
        &self,
        locator: &Locator,
        receipt_handle: &str,
    ) -> Result<(), BackendError>;

    /// Acknowledge multiple messages in one call
    async fn delete_message_batch(
        &self,
        locator: &Locator,
        entries: Vec<DeleteBatchEntry>,
    ) -> Result<(), BackendError>;

    /// Create a topic. Idempotent for an existing topic of the same name.
    async fn create_topic(&self, name: &str) -> Result<CreatedResource, BackendError>;

    /// Subscribe an endpoint to a topic.
    ///
    /// The protocol string identifies the endpoint kind; queue endpoints are
    /// addressed by their ARN.
    async fn subscribe(
        &self,
        topic: &Locator,
        protocol: &str,
        endpoint: &str,
    ) -> Result<SubscriptionRef, BackendError>;

    /// Set a single attribute on an existing subscription
    async fn set_subscription_attributes(
        &self,
        subscription: &SubscriptionRef,
        name: &str,
        value: &str,
    ) -> Result<(), BackendError>;

    /// Publish a message to a topic, fanning out to all subscriptions
    async fn publish(&self, topic: &Locator, message: String)
        -> Result<SentMessage, BackendError>;
}
