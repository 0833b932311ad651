//! The top-level messenger: resource registries and the combined
//! produce/consume surface.
//!
//! A [`Messenger`] owns one backend connection, a registry of declared
//! queues and topics keyed by logical name, and a producer. Registries are
//! per instance; two messengers over the same backend do not see each
//! other's declarations.

use crate::config::MessengerConfig;
use crate::consumer::{Consumer, ConsumerOptions, HandlerKind};
use crate::error::{LoggingErrorSink, MessengerError, SharedErrorSink};
use crate::handler::{BatchHandler, MessageHandler};
use crate::producer::Producer;
use crate::queue::{Queue, QueueOptions};
use crate::topic::Topic;
use courier_runtime::{SendOptions, SentMessage, SharedBackend};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[cfg(test)]
#[path = "messenger_tests.rs"]
mod tests;

/// Options for registering a queue with the messenger
#[derive(Debug, Clone, Default)]
pub struct CreateQueueOptions {
    /// Declaration options for the queue itself
    pub queue: QueueOptions,
    /// Topics the queue is bound to once both sides are ready
    pub bind_topics: Vec<Arc<Topic>>,
}

impl CreateQueueOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue declaration options
    pub fn with_queue_options(mut self, options: QueueOptions) -> Self {
        self.queue = options;
        self
    }

    /// Bind the queue to a topic once both are ready
    pub fn bind_topic(mut self, topic: Arc<Topic>) -> Self {
        self.bind_topics.push(topic);
        self
    }
}

/// Orchestrates queues, topics, consumers, and a producer over one backend
///
/// # Examples
///
/// ```rust
/// use courier_core::{CreateQueueOptions, Messenger, MessengerConfig, SendOptions};
/// use courier_runtime::InMemoryBackend;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let backend = Arc::new(InMemoryBackend::new());
/// let messenger = Messenger::new(backend, MessengerConfig::new());
///
/// let queue = messenger
///     .create_queue("orders", CreateQueueOptions::new())
///     .await;
/// queue.wait_ready().await.unwrap();
///
/// messenger
///     .send_to_queue("orders", &serde_json::json!({"n": 1}), SendOptions::new())
///     .await
///     .unwrap();
/// # });
/// ```
pub struct Messenger {
    backend: SharedBackend,
    config: MessengerConfig,
    producer: Producer,
    error_sink: SharedErrorSink,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    topics: Mutex<HashMap<String, Arc<Topic>>>,
}

impl Messenger {
    /// Create a messenger over a backend.
    ///
    /// Consumer-side failures that have no caller to return to are logged;
    /// use [`Messenger::with_error_sink`] to route them elsewhere.
    pub fn new(backend: SharedBackend, config: MessengerConfig) -> Self {
        let producer = Producer::new(Arc::clone(&backend));
        Self {
            backend,
            config,
            producer,
            error_sink: Arc::new(LoggingErrorSink),
            queues: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the error sink receiving consumer-side failures
    pub fn with_error_sink(mut self, sink: SharedErrorSink) -> Self {
        self.error_sink = sink;
        self
    }

    // ========================================================================
    // Declaration
    // ========================================================================

    /// Declare a queue and register it under its logical name.
    ///
    /// Registering a name twice returns the existing queue unchanged; the
    /// second call's options, including topic bindings, are ignored. Topic
    /// bindings happen in the background once the queue and each topic have
    /// settled ready.
    pub async fn create_queue(&self, name: &str, options: CreateQueueOptions) -> Arc<Queue> {
        let queue = {
            let mut queues = self.queues.lock().await;
            if let Some(existing) = queues.get(name) {
                tracing::debug!(queue = %name, "queue already registered");
                return Arc::clone(existing);
            }
            let queue = Queue::declare(
                Arc::clone(&self.backend),
                &self.config,
                Arc::clone(&self.error_sink),
                name,
                options.queue,
            );
            queues.insert(name.to_string(), Arc::clone(&queue));
            queue
        };

        for topic in options.bind_topics {
            let binding = Arc::clone(&queue);
            let sink = Arc::clone(&self.error_sink);
            tokio::spawn(async move {
                if let Err(error) = binding.wait_ready().await {
                    sink.report(&error);
                    return;
                }
                if let Err(error) = topic.subscribe(&binding).await {
                    sink.report(&error);
                }
            });
        }

        queue
    }

    /// Declare a topic and register it under its logical name.
    ///
    /// Registering a name twice returns the existing topic unchanged.
    pub async fn create_topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.lock().await;
        if let Some(existing) = topics.get(name) {
            tracing::debug!(topic = %name, "topic already registered");
            return Arc::clone(existing);
        }
        let topic = Topic::declare(
            Arc::clone(&self.backend),
            &self.config,
            Arc::clone(&self.error_sink),
            name,
        );
        topics.insert(name.to_string(), Arc::clone(&topic));
        topic
    }

    /// Look up a registered queue by logical name
    pub async fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.lock().await.get(name).cloned()
    }

    /// Look up a registered topic by logical name
    pub async fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.lock().await.get(name).cloned()
    }

    /// Wait for every registered queue and topic to settle ready.
    ///
    /// Returns the first declaration failure encountered.
    pub async fn ready(&self) -> Result<(), MessengerError> {
        let queues: Vec<Arc<Queue>> = self.queues.lock().await.values().cloned().collect();
        let topics: Vec<Arc<Topic>> = self.topics.lock().await.values().cloned().collect();

        for queue in queues {
            queue.wait_ready().await?;
        }
        for topic in topics {
            topic.wait_ready().await?;
        }
        Ok(())
    }

    // ========================================================================
    // Consumption
    // ========================================================================

    /// Start consumers dispatching one message per handler call.
    ///
    /// Starts [`ConsumerOptions::instances`] identical consumers sharing the
    /// handler. The queue must already be registered.
    pub async fn on_message<H>(
        &self,
        queue_name: &str,
        handler: H,
        options: ConsumerOptions,
    ) -> Result<Vec<Arc<Consumer>>, MessengerError>
    where
        H: MessageHandler + 'static,
    {
        let queue = self.registered_queue(queue_name).await?;
        let handler: Arc<dyn MessageHandler> = Arc::new(handler);

        let instances = options.instances.max(1);
        let mut consumers = Vec::with_capacity(instances);
        for _ in 0..instances {
            let consumer = queue
                .consume(HandlerKind::Single(Arc::clone(&handler)), options.clone())
                .await;
            consumers.push(consumer);
        }
        Ok(consumers)
    }

    /// Start consumers dispatching whole batches per handler call
    pub async fn on_batch<H>(
        &self,
        queue_name: &str,
        handler: H,
        options: ConsumerOptions,
    ) -> Result<Vec<Arc<Consumer>>, MessengerError>
    where
        H: BatchHandler + 'static,
    {
        let queue = self.registered_queue(queue_name).await?;
        let handler: Arc<dyn BatchHandler> = Arc::new(handler);

        let instances = options.instances.max(1);
        let mut consumers = Vec::with_capacity(instances);
        for _ in 0..instances {
            let consumer = queue
                .consume(HandlerKind::Batch(Arc::clone(&handler)), options.clone())
                .await;
            consumers.push(consumer);
        }
        Ok(consumers)
    }

    // ========================================================================
    // Production
    // ========================================================================

    /// Publish a payload to a registered topic
    pub async fn send_to_topic<T>(
        &self,
        topic_name: &str,
        payload: &T,
    ) -> Result<SentMessage, MessengerError>
    where
        T: Serialize,
    {
        let topic = self.registered_topic(topic_name).await?;
        self.producer.send_to_topic(&topic, payload).await
    }

    /// Send a payload directly to a registered queue
    pub async fn send_to_queue<T>(
        &self,
        queue_name: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<SentMessage, MessengerError>
    where
        T: Serialize,
    {
        let queue = self.registered_queue(queue_name).await?;
        self.producer.send_to_queue(&queue, payload, options).await
    }

    /// Send multiple payloads to a registered queue in one batch
    pub async fn send_to_queue_batch<T>(
        &self,
        queue_name: &str,
        payloads: &[T],
    ) -> Result<(), MessengerError>
    where
        T: Serialize,
    {
        let queue = self.registered_queue(queue_name).await?;
        self.producer.send_to_queue_batch(&queue, payloads).await
    }

    /// The producer bound to this messenger's backend
    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    /// The configuration this messenger was created with
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Shut down every consumer of every registered queue, waiting up to
    /// `timeout` per consumer for in-flight batches.
    pub async fn shutdown(&self, timeout: Duration) {
        let queues: Vec<Arc<Queue>> = self.queues.lock().await.values().cloned().collect();
        futures::future::join_all(queues.iter().map(|queue| queue.shutdown(timeout))).await;
        tracing::info!("messenger shutdown complete");
    }

    async fn registered_queue(&self, name: &str) -> Result<Arc<Queue>, MessengerError> {
        self.queue(name)
            .await
            .ok_or_else(|| MessengerError::QueueNotFound {
                name: name.to_string(),
            })
    }

    async fn registered_topic(&self, name: &str) -> Result<Arc<Topic>, MessengerError> {
        self.topic(name)
            .await
            .ok_or_else(|| MessengerError::TopicNotFound {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
