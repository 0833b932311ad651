//! In-memory backend implementation for testing and development.
//!
//! This module provides a fully functional in-memory backend that:
//! - Implements visibility timeouts with lazy reactivation
//! - Tracks receive counts and rotates receipt handles per delivery
//! - Long-polls receives with wakeups on new messages
//! - Fans out published topic messages to queue subscriptions
//!
//! This backend is intended for:
//! - Unit and integration testing of courier consumers
//! - Development and prototyping
//! - Reference behavior for cloud provider adapters
//!
//! Topic deliveries are always raw message bodies; the
//! `RawMessageDelivery` subscription attribute is stored but does not
//! change delivery shape here.

use crate::backend::QueueBackend;
use crate::error::BackendError;
use crate::message::{
    DeleteBatchEntry, MessageId, ReceiptHandle, ReceiveOptions, ReceivedMessage, SendBatchEntry,
    SendOptions, SentMessage,
};
use crate::resource::{CreatedResource, Locator, QueueAttributes, SubscriptionRef};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Visibility timeout applied when neither the receive options nor the queue
/// attributes specify one
const DEFAULT_VISIBILITY_TIMEOUT_SECS: u32 = 30;

/// Message size limit applied when the queue attributes do not specify one
const DEFAULT_MAX_MESSAGE_SIZE: u64 = 262_144;

/// Largest accepted batch for batched sends and deletes
const MAX_BATCH_ENTRIES: usize = 10;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in a queue with delivery metadata
struct StoredMessage {
    message_id: MessageId,
    body: String,
    receive_count: u32,
    visible_at: DateTime<Utc>,
}

/// A message currently held invisible by a receiver
struct InFlightMessage {
    message: StoredMessage,
    visibility_expires_at: DateTime<Utc>,
}

/// Internal state for a single queue
struct MemoryQueue {
    name: String,
    attributes: QueueAttributes,
    /// Main message store (FIFO order)
    messages: VecDeque<StoredMessage>,
    /// In-flight messages keyed by their current receipt handle
    in_flight: HashMap<String, InFlightMessage>,
    /// Wakes long-polling receivers when messages arrive
    notify: Arc<Notify>,
}

impl MemoryQueue {
    fn new(name: String, attributes: QueueAttributes) -> Self {
        Self {
            name,
            attributes,
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Move in-flight messages whose visibility timeout has elapsed back to
    /// the message store. Their receipt handles become invalid.
    fn reactivate_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, held)| held.visibility_expires_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(held) = self.in_flight.remove(&receipt) {
                let mut message = held.message;
                message.visible_at = now;
                self.messages.push_back(message);
            }
        }
    }

    /// Earliest future instant at which a delayed or in-flight message
    /// becomes visible again
    fn next_visibility_change(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.messages
            .iter()
            .map(|m| m.visible_at)
            .chain(self.in_flight.values().map(|m| m.visibility_expires_at))
            .filter(|at| *at > now)
            .min()
    }

    fn enqueue(&mut self, body: String, delay_seconds: u32) {
        let visible_at = Utc::now() + Duration::seconds(i64::from(delay_seconds));
        self.messages.push_back(StoredMessage {
            message_id: MessageId::new(),
            body,
            receive_count: 0,
            visible_at,
        });
    }
}

/// Internal state for a single topic
struct MemoryTopic {
    name: String,
    subscriptions: Vec<MemorySubscription>,
}

struct MemorySubscription {
    reference: SubscriptionRef,
    protocol: String,
    endpoint: String,
    attributes: HashMap<String, String>,
}

/// All backend state behind one lock. Queues and topics are keyed by their
/// locator string.
#[derive(Default)]
struct BackendState {
    queues: HashMap<String, MemoryQueue>,
    topics: HashMap<String, MemoryTopic>,
}

impl BackendState {
    fn queue_mut(&mut self, locator: &Locator) -> Result<&mut MemoryQueue, BackendError> {
        self.queues
            .get_mut(locator.as_str())
            .ok_or_else(|| BackendError::NotFound {
                locator: locator.to_string(),
            })
    }

    /// Resolve a subscription endpoint to a queue by its trailing name
    /// segment
    fn queue_by_endpoint(&mut self, endpoint: &str) -> Option<&mut MemoryQueue> {
        let segment = endpoint
            .rsplit(|c| c == ':' || c == '/')
            .next()
            .unwrap_or(endpoint);
        self.queues.values_mut().find(|q| q.name == segment)
    }
}

// ============================================================================
// Observability for tests
// ============================================================================

/// Point-in-time counts for a single queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Messages available for immediate receive
    pub visible: usize,
    /// Messages held invisible by receivers
    pub in_flight: usize,
    /// Messages waiting out a delivery delay
    pub delayed: usize,
}

// ============================================================================
// Backend Implementation
// ============================================================================

/// In-memory implementation of [`QueueBackend`]
///
/// # Examples
///
/// ```rust
/// use courier_runtime::{
///     InMemoryBackend, QueueAttributes, QueueBackend, ReceiveOptions, SendOptions,
/// };
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new();
/// let queue = backend
///     .create_queue("orders", QueueAttributes::new())
///     .await
///     .unwrap();
///
/// backend
///     .send_message(&queue.locator, r#"{"n":1}"#.to_string(), SendOptions::new())
///     .await
///     .unwrap();
///
/// let batch = backend
///     .receive_message_batch(&queue.locator, ReceiveOptions::new())
///     .await
///     .unwrap();
/// assert_eq!(batch.len(), 1);
/// # });
/// ```
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
        }
    }

    fn queue_locator(name: &str) -> Result<Locator, BackendError> {
        Ok(Locator::new(format!("memory://queue/{}", name))?)
    }

    fn topic_locator(name: &str) -> Result<Locator, BackendError> {
        Ok(Locator::new(format!("memory://topic/{}", name))?)
    }

    fn validate_name(name: &str, field: &str) -> Result<(), BackendError> {
        if name.is_empty() {
            return Err(crate::error::ValidationError::Required {
                field: field.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Point-in-time counts for a queue. Intended for tests and diagnostics.
    pub async fn queue_stats(&self, locator: &Locator) -> Result<QueueStats, BackendError> {
        let mut state = self.state.lock().await;
        let queue = state.queue_mut(locator)?;
        let now = Utc::now();
        queue.reactivate_expired(now);

        let delayed = queue.messages.iter().filter(|m| m.visible_at > now).count();
        Ok(QueueStats {
            visible: queue.messages.len() - delayed,
            in_flight: queue.in_flight.len(),
            delayed,
        })
    }

    /// Number of subscriptions on a topic. Intended for tests and
    /// diagnostics.
    pub async fn subscription_count(&self, topic: &Locator) -> Result<usize, BackendError> {
        let state = self.state.lock().await;
        state
            .topics
            .get(topic.as_str())
            .map(|t| t.subscriptions.len())
            .ok_or_else(|| BackendError::NotFound {
                locator: topic.to_string(),
            })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    async fn create_queue(
        &self,
        name: &str,
        attributes: QueueAttributes,
    ) -> Result<CreatedResource, BackendError> {
        Self::validate_name(name, "queue_name")?;
        let locator = Self::queue_locator(name)?;

        let mut state = self.state.lock().await;
        if let Some(existing) = state.queues.get(locator.as_str()) {
            // Re-creating with identical attributes is idempotent; a name
            // collision with different attributes is an error.
            if existing.attributes == attributes {
                return Ok(CreatedResource { locator });
            }
            return Err(BackendError::AlreadyExists {
                name: name.to_string(),
            });
        }

        tracing::debug!(queue = %name, "creating in-memory queue");
        state.queues.insert(
            locator.as_str().to_string(),
            MemoryQueue::new(name.to_string(), attributes),
        );

        Ok(CreatedResource { locator })
    }

    async fn send_message(
        &self,
        locator: &Locator,
        body: String,
        options: SendOptions,
    ) -> Result<SentMessage, BackendError> {
        let notify = {
            let mut state = self.state.lock().await;
            let queue = state.queue_mut(locator)?;

            let max_size = queue
                .attributes
                .max_message_size
                .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE);
            if body.len() as u64 > max_size {
                return Err(BackendError::MessageTooLarge {
                    size: body.len(),
                    max_size: max_size as usize,
                });
            }

            let delay = options
                .delay_seconds
                .or(queue.attributes.delay_seconds)
                .unwrap_or(0);
            queue.enqueue(body, delay);
            Arc::clone(&queue.notify)
        };

        notify.notify_one();
        Ok(SentMessage {
            message_id: MessageId::new(),
        })
    }

    async fn send_message_batch(
        &self,
        locator: &Locator,
        entries: Vec<SendBatchEntry>,
    ) -> Result<(), BackendError> {
        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(BackendError::BatchTooLarge {
                size: entries.len(),
                max_size: MAX_BATCH_ENTRIES,
            });
        }

        let (notify, count) = {
            let mut state = self.state.lock().await;
            let queue = state.queue_mut(locator)?;
            let delay = queue.attributes.delay_seconds.unwrap_or(0);
            let count = entries.len();
            for entry in entries {
                queue.enqueue(entry.body, delay);
            }
            (Arc::clone(&queue.notify), count)
        };

        for _ in 0..count {
            notify.notify_one();
        }
        Ok(())
    }

    async fn receive_message_batch(
        &self,
        locator: &Locator,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, BackendError> {
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(u64::from(options.wait_seconds));

        loop {
            let (batch, notify, next_change) = {
                let mut state = self.state.lock().await;
                let queue = state.queue_mut(locator)?;
                let now = Utc::now();
                queue.reactivate_expired(now);

                let visibility = options
                    .visibility_timeout
                    .or(queue.attributes.visibility_timeout)
                    .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_SECS);

                let mut batch = Vec::new();
                let mut index = 0;
                while index < queue.messages.len()
                    && (batch.len() as u32) < options.max_messages
                {
                    if queue.messages[index].visible_at > now {
                        index += 1;
                        continue;
                    }
                    if let Some(mut message) = queue.messages.remove(index) {
                        message.receive_count += 1;
                        let receipt =
                            ReceiptHandle::new(uuid::Uuid::new_v4().to_string())?;
                        batch.push(ReceivedMessage {
                            message_id: message.message_id.clone(),
                            receipt_handle: receipt.clone(),
                            body: message.body.clone(),
                            receive_count: message.receive_count,
                        });
                        queue.in_flight.insert(
                            receipt.as_str().to_string(),
                            InFlightMessage {
                                message,
                                visibility_expires_at: now
                                    + Duration::seconds(i64::from(visibility)),
                            },
                        );
                    }
                }

                (
                    batch,
                    Arc::clone(&queue.notify),
                    queue.next_visibility_change(now),
                )
            };

            if !batch.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(batch);
            }

            // Empty queue: wait for a push, the next visibility change, or
            // the poll deadline, whichever comes first.
            let wake_at = match next_change {
                Some(at) => {
                    let until = (at - Utc::now()).to_std().unwrap_or_default();
                    deadline.min(tokio::time::Instant::now() + until)
                }
                None => deadline,
            };

            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete_message(
        &self,
        locator: &Locator,
        receipt_handle: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        let queue = state.queue_mut(locator)?;
        queue.reactivate_expired(Utc::now());

        queue
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| BackendError::InvalidReceipt {
                receipt: receipt_handle.to_string(),
            })
    }

    async fn delete_message_batch(
        &self,
        locator: &Locator,
        entries: Vec<DeleteBatchEntry>,
    ) -> Result<(), BackendError> {
        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(BackendError::BatchTooLarge {
                size: entries.len(),
                max_size: MAX_BATCH_ENTRIES,
            });
        }

        let mut state = self.state.lock().await;
        let queue = state.queue_mut(locator)?;
        queue.reactivate_expired(Utc::now());

        // Entries are applied in order; the first stale receipt fails the
        // call with earlier deletions already in effect.
        for entry in entries {
            queue
                .in_flight
                .remove(entry.receipt_handle.as_str())
                .ok_or_else(|| BackendError::InvalidReceipt {
                    receipt: entry.receipt_handle.to_string(),
                })?;
        }
        Ok(())
    }

    async fn create_topic(&self, name: &str) -> Result<CreatedResource, BackendError> {
        Self::validate_name(name, "topic_name")?;
        let locator = Self::topic_locator(name)?;

        let mut state = self.state.lock().await;
        if !state.topics.contains_key(locator.as_str()) {
            tracing::debug!(topic = %name, "creating in-memory topic");
            state.topics.insert(
                locator.as_str().to_string(),
                MemoryTopic {
                    name: name.to_string(),
                    subscriptions: Vec::new(),
                },
            );
        }

        Ok(CreatedResource { locator })
    }

    async fn subscribe(
        &self,
        topic: &Locator,
        protocol: &str,
        endpoint: &str,
    ) -> Result<SubscriptionRef, BackendError> {
        let mut state = self.state.lock().await;
        let memory_topic =
            state
                .topics
                .get_mut(topic.as_str())
                .ok_or_else(|| BackendError::NotFound {
                    locator: topic.to_string(),
                })?;

        // Subscribing the same endpoint twice returns the existing
        // subscription.
        if let Some(existing) = memory_topic
            .subscriptions
            .iter()
            .find(|s| s.endpoint == endpoint)
        {
            return Ok(existing.reference.clone());
        }

        let reference = SubscriptionRef::new(format!(
            "memory://subscription/{}/{}",
            memory_topic.name,
            uuid::Uuid::new_v4()
        ))?;
        memory_topic.subscriptions.push(MemorySubscription {
            reference: reference.clone(),
            protocol: protocol.to_string(),
            endpoint: endpoint.to_string(),
            attributes: HashMap::new(),
        });

        Ok(reference)
    }

    async fn set_subscription_attributes(
        &self,
        subscription: &SubscriptionRef,
        name: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        for topic in state.topics.values_mut() {
            if let Some(found) = topic
                .subscriptions
                .iter_mut()
                .find(|s| s.reference == *subscription)
            {
                found
                    .attributes
                    .insert(name.to_string(), value.to_string());
                return Ok(());
            }
        }

        Err(BackendError::SubscriptionNotFound {
            reference: subscription.to_string(),
        })
    }

    async fn publish(
        &self,
        topic: &Locator,
        message: String,
    ) -> Result<SentMessage, BackendError> {
        let notifies = {
            let mut state = self.state.lock().await;
            let memory_topic =
                state
                    .topics
                    .get(topic.as_str())
                    .ok_or_else(|| BackendError::NotFound {
                        locator: topic.to_string(),
                    })?;

            let targets: Vec<(String, String)> = memory_topic
                .subscriptions
                .iter()
                .map(|s| (s.protocol.clone(), s.endpoint.clone()))
                .collect();

            let mut notifies = Vec::new();
            for (protocol, endpoint) in targets {
                match state.queue_by_endpoint(&endpoint) {
                    Some(queue) => {
                        let delay = queue.attributes.delay_seconds.unwrap_or(0);
                        queue.enqueue(message.clone(), delay);
                        notifies.push(Arc::clone(&queue.notify));
                    }
                    None => {
                        tracing::debug!(
                            protocol = %protocol,
                            endpoint = %endpoint,
                            "subscription endpoint does not resolve to a queue, skipping"
                        );
                    }
                }
            }
            notifies
        };

        for notify in notifies {
            notify.notify_one();
        }

        Ok(SentMessage {
            message_id: MessageId::new(),
        })
    }
}
