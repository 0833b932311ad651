//! Producing messages to queues and topics.
//!
//! Payloads must serialize to JSON objects; the producer stamps a `_meta`
//! member into each one before sending so consumers can tell where a message
//! entered the system. Sends wait briefly for the target resource to settle
//! but do not block indefinitely behind a stuck declaration.

use crate::error::MessengerError;
use crate::queue::Queue;
use crate::topic::Topic;
use courier_runtime::{SendBatchEntry, SendOptions, SentMessage, SharedBackend};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Member stamped into every outgoing payload
const META_KEY: &str = "_meta";

/// How long a send waits for the target resource to become ready
const READINESS_WAIT: Duration = Duration::from_secs(2);

/// Sends enveloped payloads to declared queues and topics
pub struct Producer {
    backend: SharedBackend,
}

impl Producer {
    /// Create a producer on the given backend
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Publish a payload to a topic, fanning out to its bound queues.
    ///
    /// The envelope records the topic name so consumers can distinguish
    /// fanned-out messages from direct sends.
    pub async fn send_to_topic<T>(
        &self,
        topic: &Topic,
        payload: &T,
    ) -> Result<SentMessage, MessengerError>
    where
        T: Serialize,
    {
        let body = envelope(payload, json!({ "topicName": topic.name() }))?;
        let locator = topic.wait_ready_timeout(READINESS_WAIT).await?;
        let sent = self.backend.publish(&locator, body).await?;
        Ok(sent)
    }

    /// Send a payload directly to a queue
    pub async fn send_to_queue<T>(
        &self,
        queue: &Queue,
        payload: &T,
        options: SendOptions,
    ) -> Result<SentMessage, MessengerError>
    where
        T: Serialize,
    {
        let body = envelope(payload, json!({}))?;
        let locator = queue.wait_ready_timeout(READINESS_WAIT).await?;
        let sent = self.backend.send_message(&locator, body, options).await?;
        Ok(sent)
    }

    /// Send multiple payloads to a queue in one batch.
    ///
    /// Entries are tagged with their zero-based position in `payloads`.
    pub async fn send_to_queue_batch<T>(
        &self,
        queue: &Queue,
        payloads: &[T],
    ) -> Result<(), MessengerError>
    where
        T: Serialize,
    {
        let mut entries = Vec::with_capacity(payloads.len());
        for (index, payload) in payloads.iter().enumerate() {
            let body = envelope(payload, json!({}))?;
            entries.push(SendBatchEntry::new(index.to_string(), body));
        }

        let locator = queue.wait_ready_timeout(READINESS_WAIT).await?;
        self.backend.send_message_batch(&locator, entries).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer").finish_non_exhaustive()
    }
}

/// Serialize a payload and stamp the `_meta` member into it.
///
/// Envelopes are built before any readiness wait so an unserializable
/// payload fails fast even when the target resource never settles.
fn envelope<T>(payload: &T, meta: Value) -> Result<String, MessengerError>
where
    T: Serialize,
{
    let mut value = serde_json::to_value(payload)?;
    match value.as_object_mut() {
        Some(object) => {
            object.insert(META_KEY.to_string(), meta);
        }
        None => {
            return Err(MessengerError::PayloadNotObject {
                kind: value_kind(&value).to_string(),
            });
        }
    }
    let body = serde_json::to_string(&value)?;
    Ok(body)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
