//! Message consumption.
//!
//! A [`Consumer`] runs one receive loop against its queue: long-poll a batch,
//! redirect over-delivered messages to the dead-letter queue, decode the
//! rest, dispatch to the handler, and acknowledge what the handler completed.
//! Messages are only deleted after their handler call returns success, so a
//! crash at any point leads to redelivery rather than loss.

use crate::error::{MessengerError, SharedErrorSink};
use crate::handler::{BatchHandler, MessageHandler};
use crate::queue::Queue;
use crate::readiness::DeclarationState;
use courier_runtime::{DeleteBatchEntry, Locator, ReceiveOptions, ReceivedMessage, SendOptions};
use futures::future::join_all;
use rand::Rng;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Largest batch a single receive may request
const MAX_BATCH_SIZE: u32 = 10;

/// Consecutive receive failures after which the consumer halts itself
const MAX_CONSECUTIVE_RECEIVE_FAILURES: u32 = 5;

const RECEIVE_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const RECEIVE_BACKOFF_MAX: Duration = Duration::from_secs(16);
const RECEIVE_BACKOFF_MULTIPLIER: f64 = 2.0;
const RECEIVE_BACKOFF_JITTER: f64 = 0.25;

/// Options controlling a consumer's receive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Messages requested per receive, clamped to the backend maximum of 10
    pub batch_size: u32,
    /// Visibility timeout override in seconds; the queue's own timeout
    /// applies when unset
    pub visibility_timeout_secs: Option<u32>,
    /// Long-poll wait per receive in seconds
    pub wait_time_secs: u32,
    /// Number of identical consumers to start when registering through the
    /// messenger
    pub instances: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            visibility_timeout_secs: None,
            wait_time_secs: 20,
            instances: 1,
        }
    }
}

impl ConsumerOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of messages requested per receive
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Override the visibility timeout in seconds for received messages
    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout_secs = Some(seconds);
        self
    }

    /// Set the long-poll wait per receive in seconds
    pub fn with_wait_time(mut self, seconds: u32) -> Self {
        self.wait_time_secs = seconds;
        self
    }

    /// Set the number of identical consumers to start
    pub fn with_instances(mut self, instances: usize) -> Self {
        self.instances = instances;
        self
    }
}

/// The two dispatch shapes a consumer can run
pub(crate) enum HandlerKind {
    /// One handler call per message, messages of a batch dispatched
    /// concurrently and acknowledged individually
    Single(Arc<dyn MessageHandler>),
    /// One handler call per batch, acknowledged as a whole
    Batch(Arc<dyn BatchHandler>),
}

/// A message that survived redirect and decode, still carrying its position
/// in the received batch for acknowledgement ids.
struct DecodedMessage {
    batch_index: usize,
    message: ReceivedMessage,
    payload: Value,
}

/// Exponential backoff between failed receives.
///
/// Delays grow from 1s doubling up to 16s, with 25% jitter in either
/// direction.
struct ReceiveBackoff {
    consecutive_failures: u32,
}

impl ReceiveBackoff {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
        }
    }

    fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failure, returning the consecutive failure count
    fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    fn delay(&self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(1);
        let base = RECEIVE_BACKOFF_INITIAL.as_secs_f64()
            * RECEIVE_BACKOFF_MULTIPLIER.powi(exponent as i32);
        let capped = base.min(RECEIVE_BACKOFF_MAX.as_secs_f64());

        let jitter_bound = capped * RECEIVE_BACKOFF_JITTER;
        let mut rng = rand::rng();
        let jitter = rng.random_range(-jitter_bound..=jitter_bound);

        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// A running consumer attached to one queue.
///
/// Created through [`Queue::on_message`], [`Queue::on_batch`], or the
/// messenger's registration methods. The receive loop starts as soon as the
/// queue settles ready and runs until [`Consumer::stop`] or
/// [`Consumer::shutdown`].
pub struct Consumer {
    queue: Arc<Queue>,
    handler: HandlerKind,
    options: ConsumerOptions,
    running: AtomicBool,
    busy: watch::Sender<bool>,
    error_sink: SharedErrorSink,
}

impl Consumer {
    pub(crate) fn spawn(
        queue: Arc<Queue>,
        handler: HandlerKind,
        mut options: ConsumerOptions,
        error_sink: SharedErrorSink,
    ) -> Arc<Self> {
        options.batch_size = options.batch_size.clamp(1, MAX_BATCH_SIZE);
        let (busy, _) = watch::channel(false);
        let consumer = Arc::new(Self {
            queue,
            handler,
            options,
            running: AtomicBool::new(false),
            busy,
            error_sink,
        });

        let looping = Arc::clone(&consumer);
        tokio::spawn(async move { looping.run().await });

        consumer
    }

    async fn run(self: Arc<Self>) {
        let locator = match self.queue.wait_ready().await {
            Ok(locator) => locator,
            Err(error) => {
                self.error_sink.report(&error);
                return;
            }
        };

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(queue = %self.queue.name(), "consumer started");

        let mut backoff = ReceiveBackoff::new();
        while self.running.load(Ordering::SeqCst) {
            let received = self
                .queue
                .backend()
                .receive_message_batch(&locator, self.receive_options())
                .await;

            match received {
                Ok(messages) => {
                    backoff.reset();
                    // A shutdown that raced this poll wins; the batch stays
                    // invisible until its visibility timeout lapses and is
                    // redelivered elsewhere.
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    if messages.is_empty() {
                        continue;
                    }
                    self.busy.send_replace(true);
                    self.process_batch(&locator, messages).await;
                    self.busy.send_replace(false);
                }
                Err(error) => {
                    let failures = backoff.record_failure();
                    self.error_sink.report(&MessengerError::Receive {
                        queue: self.queue.name().to_string(),
                        source: error,
                    });
                    if failures >= MAX_CONSECUTIVE_RECEIVE_FAILURES {
                        self.error_sink.report(&MessengerError::ReceiveHalted {
                            queue: self.queue.name().to_string(),
                            failures,
                        });
                        self.running.store(false, Ordering::SeqCst);
                        break;
                    }
                    tokio::time::sleep(backoff.delay()).await;
                }
            }
        }

        tracing::info!(queue = %self.queue.name(), "consumer stopped");
    }

    fn receive_options(&self) -> ReceiveOptions {
        let mut options = ReceiveOptions::new()
            .with_max_messages(self.options.batch_size)
            .with_wait_seconds(self.options.wait_time_secs);
        if let Some(visibility) = self.options.visibility_timeout_secs {
            options = options.with_visibility_timeout(visibility);
        }
        options
    }

    /// Visibility window for this consumer's deliveries, also the bound on
    /// one dispatch round
    fn visibility_secs(&self) -> u32 {
        self.options
            .visibility_timeout_secs
            .unwrap_or(self.queue.options().visibility_timeout_secs)
    }

    async fn process_batch(&self, locator: &Locator, messages: Vec<ReceivedMessage>) {
        let work: Vec<(usize, ReceivedMessage)> = messages.into_iter().enumerate().collect();
        let work = self.redirect_over_delivered(locator, work).await;

        let mut decoded: Vec<DecodedMessage> = Vec::with_capacity(work.len());
        for (batch_index, message) in work {
            match serde_json::from_str::<Value>(&message.body) {
                Ok(payload) => decoded.push(DecodedMessage {
                    batch_index,
                    message,
                    payload,
                }),
                Err(error) => {
                    tracing::warn!(
                        queue = %self.queue.name(),
                        message_id = %message.message_id,
                        error = %error,
                        "dropping undecodable message"
                    );
                }
            }
        }
        if decoded.is_empty() {
            return;
        }

        // Dispatch may not outlive the visibility window: past it the batch
        // is redelivered and these receipts go stale. Expiry cancels the
        // handler futures.
        let visibility_secs = self.visibility_secs();
        let dispatched = tokio::time::timeout(
            Duration::from_secs(u64::from(visibility_secs)),
            self.dispatch(locator, &decoded),
        )
        .await;
        if dispatched.is_err() {
            self.error_sink.report(&MessengerError::HandlerTimeout {
                queue: self.queue.name().to_string(),
                timeout_secs: visibility_secs,
            });
        }
    }

    /// Move messages past the queue's delivery limit to the dead-letter
    /// queue, returning the batch entries still eligible for dispatch.
    ///
    /// Redirect is send first, delete second. A failed send leaves the
    /// message untouched for redelivery; a failed delete after a successful
    /// send means the dead-letter queue may see the message twice.
    async fn redirect_over_delivered(
        &self,
        locator: &Locator,
        work: Vec<(usize, ReceivedMessage)>,
    ) -> Vec<(usize, ReceivedMessage)> {
        let Some(dead_letter) = self.queue.dead_letter() else {
            return work;
        };
        let DeclarationState::Ready(dead_letter_locator) = dead_letter.state() else {
            return work;
        };
        let max_receive_count = self.queue.options().max_receive_count;

        let mut kept = Vec::with_capacity(work.len());
        for (batch_index, message) in work {
            if message.receive_count <= max_receive_count {
                kept.push((batch_index, message));
                continue;
            }

            tracing::warn!(
                queue = %self.queue.name(),
                message_id = %message.message_id,
                receive_count = message.receive_count,
                "redirecting over-delivered message to dead-letter queue"
            );
            let sent = self
                .queue
                .backend()
                .send_message(&dead_letter_locator, message.body, SendOptions::new())
                .await;
            match sent {
                Ok(_) => {
                    if let Err(error) = self
                        .queue
                        .backend()
                        .delete_message(locator, message.receipt_handle.as_str())
                        .await
                    {
                        self.error_sink.report(&MessengerError::Ack {
                            queue: self.queue.name().to_string(),
                            source: error,
                        });
                    }
                }
                Err(error) => {
                    self.error_sink.report(&MessengerError::DeadLetterRedirect {
                        queue: self.queue.name().to_string(),
                        source: error,
                    });
                }
            }
        }
        kept
    }

    async fn dispatch(&self, locator: &Locator, decoded: &[DecodedMessage]) {
        match &self.handler {
            HandlerKind::Batch(handler) => {
                let payloads: Vec<Value> = decoded.iter().map(|d| d.payload.clone()).collect();
                match handler.handle_batch(payloads).await {
                    Ok(()) => {
                        let entries: Vec<DeleteBatchEntry> = decoded
                            .iter()
                            .map(|d| {
                                DeleteBatchEntry::new(
                                    d.batch_index.to_string(),
                                    d.message.receipt_handle.clone(),
                                )
                            })
                            .collect();
                        if let Err(error) = self
                            .queue
                            .backend()
                            .delete_message_batch(locator, entries)
                            .await
                        {
                            self.error_sink.report(&MessengerError::Ack {
                                queue: self.queue.name().to_string(),
                                source: error,
                            });
                        }
                    }
                    Err(error) => {
                        self.error_sink.report(&MessengerError::Handler {
                            queue: self.queue.name().to_string(),
                            reason: error.to_string(),
                        });
                    }
                }
            }
            HandlerKind::Single(handler) => {
                let outcomes = join_all(decoded.iter().map(|d| async {
                    match handler.handle(d.payload.clone()).await {
                        Ok(()) => {
                            let deleted = self
                                .queue
                                .backend()
                                .delete_message(locator, d.message.receipt_handle.as_str())
                                .await;
                            deleted.err().map(|error| MessengerError::Ack {
                                queue: self.queue.name().to_string(),
                                source: error,
                            })
                        }
                        Err(error) => Some(MessengerError::Handler {
                            queue: self.queue.name().to_string(),
                            reason: error.to_string(),
                        }),
                    }
                }))
                .await;
                for error in outcomes.into_iter().flatten() {
                    self.error_sink.report(&error);
                }
            }
        }
    }

    /// Stop the receive loop.
    ///
    /// The poll in flight is allowed to return; any batch it carries is left
    /// unacknowledged and will be redelivered after its visibility timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the receive loop is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the consumer and wait up to `timeout` for an in-flight batch to
    /// finish processing.
    ///
    /// A zero timeout stops without waiting. Expiry is reported through the
    /// error sink, not returned, so shutdown always completes.
    pub async fn shutdown(&self, timeout: Duration) {
        self.stop();
        if timeout.is_zero() || !*self.busy.borrow() {
            return;
        }

        let mut busy = self.busy.subscribe();
        let drained = tokio::time::timeout(timeout, async {
            while *busy.borrow_and_update() {
                if busy.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        if drained.is_err() {
            self.error_sink.report(&MessengerError::ShutdownTimeout {
                queue: self.queue.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    }

    /// The queue this consumer receives from
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Options the consumer runs with, after clamping
    pub fn options(&self) -> &ConsumerOptions {
        &self.options
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue.name())
            .field("options", &self.options)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
