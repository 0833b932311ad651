//! Queue declaration and lifecycle.

use crate::config::MessengerConfig;
use crate::consumer::{Consumer, ConsumerOptions, HandlerKind};
use crate::error::{MessengerError, SharedErrorSink};
use crate::handler::{BatchHandler, MessageHandler};
use crate::policy;
use crate::readiness::{DeclarationState, Readiness};
use courier_runtime::{Locator, QueueAttributes, SharedBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Suffix appended to a queue's logical name for its dead-letter queue
const DEAD_LETTER_SUFFIX: &str = "-dl";

/// Options controlling queue creation and consumption behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Visibility timeout in seconds applied to received messages
    pub visibility_timeout_secs: u32,
    /// Maximum accepted message size in bytes
    pub max_message_size: u64,
    /// Deliveries after which a message is moved to the dead-letter queue
    pub max_receive_count: u32,
    /// Whether to declare a companion dead-letter queue
    pub with_dead_letter: bool,
    /// Default delivery delay in seconds for sent messages
    pub delay_seconds: u32,
    /// Marks the queue as a dead-letter target. Such queues are created
    /// bare, without a policy or a dead-letter queue of their own.
    pub is_dead_letter_queue: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: 30,
            max_message_size: 262_144,
            max_receive_count: 5,
            with_dead_letter: false,
            delay_seconds: 0,
            is_dead_letter_queue: false,
        }
    }
}

impl QueueOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the visibility timeout in seconds
    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout_secs = seconds;
        self
    }

    /// Set the maximum message size in bytes
    pub fn with_max_message_size(mut self, size: u64) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the delivery count threshold for dead-lettering
    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = count;
        self
    }

    /// Enable or disable the companion dead-letter queue
    pub fn with_dead_letter(mut self, enabled: bool) -> Self {
        self.with_dead_letter = enabled;
        self
    }

    /// Set the default delivery delay in seconds
    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = seconds;
        self
    }
}

/// A declared queue.
///
/// Construction via [`Queue::declare`] spawns the backend declaration in the
/// background; the queue is usable immediately and all operations that need
/// the backend resource gate on its readiness. When `with_dead_letter` is
/// set, the dead-letter queue is declared first so the owner's redrive
/// policy can reference its address.
pub struct Queue {
    name: String,
    real_name: String,
    arn: String,
    options: QueueOptions,
    readiness: Readiness,
    dead_letter: Option<Arc<Queue>>,
    consumers: Mutex<Vec<Arc<Consumer>>>,
    backend: SharedBackend,
    config: MessengerConfig,
    error_sink: SharedErrorSink,
}

impl Queue {
    /// Declare a queue, spawning the backend creation task.
    ///
    /// `name` is the logical name; the backend resource is named with the
    /// configured resource name prefix applied.
    pub fn declare(
        backend: SharedBackend,
        config: &MessengerConfig,
        error_sink: SharedErrorSink,
        name: &str,
        options: QueueOptions,
    ) -> Arc<Self> {
        let dead_letter = if options.with_dead_letter && !options.is_dead_letter_queue {
            let dead_letter_options = QueueOptions {
                with_dead_letter: false,
                delay_seconds: 0,
                is_dead_letter_queue: true,
                ..options.clone()
            };
            Some(Self::declare(
                Arc::clone(&backend),
                config,
                Arc::clone(&error_sink),
                &format!("{name}{DEAD_LETTER_SUFFIX}"),
                dead_letter_options,
            ))
        } else {
            None
        };

        let real_name = format!("{}{}", config.resource_name_prefix, name);
        let arn = format!("{}{}", config.queue_arn_prefix, real_name);
        let queue = Arc::new(Self {
            name: name.to_string(),
            real_name,
            arn,
            options,
            readiness: Readiness::new(format!("queue:{name}")),
            dead_letter,
            consumers: Mutex::new(Vec::new()),
            backend,
            config: config.clone(),
            error_sink,
        });

        let declaring = Arc::clone(&queue);
        tokio::spawn(async move { declaring.run_declaration().await });

        queue
    }

    async fn run_declaration(self: Arc<Self>) {
        self.readiness.advance(DeclarationState::Declaring);

        // The dead-letter queue must settle first; the redrive policy below
        // references its address.
        let redrive_policy = match &self.dead_letter {
            Some(dead_letter) => match dead_letter.wait_ready().await {
                Ok(_) => Some(policy::redrive_policy_json(
                    self.options.max_receive_count,
                    dead_letter.arn(),
                )),
                Err(error) => {
                    self.fail_declaration(format!("dead-letter queue failed: {error}"));
                    return;
                }
            },
            None => None,
        };

        let attributes = self.creation_attributes(redrive_policy);
        match self.backend.create_queue(&self.real_name, attributes).await {
            Ok(created) => {
                tracing::info!(queue = %self.name, locator = %created.locator, "queue ready");
                self.readiness
                    .advance(DeclarationState::Ready(created.locator));
            }
            Err(error) if error.is_already_exists() => {
                // The resource predates this process; its locator follows
                // the configured addressing scheme.
                let address = format!("{}{}", self.config.queue_locator_prefix, self.real_name);
                match Locator::new(address) {
                    Ok(locator) => {
                        tracing::info!(queue = %self.name, locator = %locator, "queue already exists");
                        self.readiness.advance(DeclarationState::Ready(locator));
                    }
                    Err(validation) => self.fail_declaration(validation.to_string()),
                }
            }
            Err(error) => self.fail_declaration(error.to_string()),
        }
    }

    fn fail_declaration(&self, reason: String) {
        tracing::error!(queue = %self.name, reason = %reason, "queue declaration failed");
        self.error_sink.report(&MessengerError::Declaration {
            resource: format!("queue:{}", self.name),
            reason: reason.clone(),
        });
        self.readiness.advance(DeclarationState::Failed(reason));
    }

    fn creation_attributes(&self, redrive_policy: Option<String>) -> QueueAttributes {
        // Dead-letter queues are created bare and take backend defaults.
        if self.options.is_dead_letter_queue {
            return QueueAttributes::new();
        }

        let mut attributes = QueueAttributes::new()
            .with_max_message_size(self.options.max_message_size)
            .with_visibility_timeout(self.options.visibility_timeout_secs)
            .with_policy(policy::access_policy_json(&self.arn));
        if self.options.delay_seconds > 0 {
            attributes = attributes.with_delay_seconds(self.options.delay_seconds);
        }
        if let Some(redrive) = redrive_policy {
            attributes = attributes.with_redrive_policy(redrive);
        }
        attributes
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Logical name the queue was declared under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend resource name, with the configured prefix applied
    pub fn real_name(&self) -> &str {
        &self.real_name
    }

    /// Computed address of the queue
    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Options the queue was declared with
    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// The companion dead-letter queue, when one was declared
    pub fn dead_letter(&self) -> Option<&Arc<Queue>> {
        self.dead_letter.as_ref()
    }

    /// Current declaration state
    pub fn state(&self) -> DeclarationState {
        self.readiness.state()
    }

    /// Wait until the queue settles, returning its locator
    pub async fn wait_ready(&self) -> Result<Locator, MessengerError> {
        self.readiness.wait_ready().await
    }

    /// Wait until the queue settles, bounded by `limit`
    pub async fn wait_ready_timeout(&self, limit: Duration) -> Result<Locator, MessengerError> {
        self.readiness.wait_ready_timeout(limit).await
    }

    pub(crate) fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    // ========================================================================
    // Consumption
    // ========================================================================

    /// Start a consumer dispatching one message per handler call
    pub async fn on_message<H>(
        self: &Arc<Self>,
        handler: H,
        options: ConsumerOptions,
    ) -> Arc<Consumer>
    where
        H: MessageHandler + 'static,
    {
        self.consume(HandlerKind::Single(Arc::new(handler)), options)
            .await
    }

    /// Start a consumer dispatching whole batches per handler call
    pub async fn on_batch<H>(
        self: &Arc<Self>,
        handler: H,
        options: ConsumerOptions,
    ) -> Arc<Consumer>
    where
        H: BatchHandler + 'static,
    {
        self.consume(HandlerKind::Batch(Arc::new(handler)), options)
            .await
    }

    pub(crate) async fn consume(
        self: &Arc<Self>,
        handler: HandlerKind,
        options: ConsumerOptions,
    ) -> Arc<Consumer> {
        let consumer = Consumer::spawn(
            Arc::clone(self),
            handler,
            options,
            Arc::clone(&self.error_sink),
        );
        self.consumers.lock().await.push(Arc::clone(&consumer));
        consumer
    }

    /// Consumers started on this queue
    pub async fn consumers(&self) -> Vec<Arc<Consumer>> {
        self.consumers.lock().await.clone()
    }

    /// Shut down every consumer of this queue, waiting up to `timeout` for
    /// in-flight batches. Consumers are shut down concurrently.
    pub async fn shutdown(&self, timeout: Duration) {
        let consumers = self.consumers().await;
        futures::future::join_all(
            consumers
                .iter()
                .map(|consumer| consumer.shutdown(timeout)),
        )
        .await;
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("real_name", &self.real_name)
            .field("arn", &self.arn)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
