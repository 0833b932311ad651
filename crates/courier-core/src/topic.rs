//! Topic declaration and queue binding.

use crate::config::MessengerConfig;
use crate::error::{MessengerError, SharedErrorSink};
use crate::queue::Queue;
use crate::readiness::{DeclarationState, Readiness};
use courier_runtime::{Locator, SharedBackend, SubscriptionRef};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;

/// Protocol under which queues subscribe to topics
const SUBSCRIPTION_PROTOCOL: &str = "queue";

/// Subscription attribute enabling raw payload delivery, without the
/// topic's own envelope
const RAW_DELIVERY_ATTRIBUTE: &str = "RawMessageDelivery";

/// A declared topic.
///
/// Construction via [`Topic::declare`] spawns the backend declaration in the
/// background. Queues are bound with [`Topic::subscribe`], which gates on the
/// topic's readiness.
pub struct Topic {
    name: String,
    real_name: String,
    readiness: Readiness,
    backend: SharedBackend,
    config: MessengerConfig,
    error_sink: SharedErrorSink,
}

impl Topic {
    /// Declare a topic, spawning the backend creation task
    pub fn declare(
        backend: SharedBackend,
        config: &MessengerConfig,
        error_sink: SharedErrorSink,
        name: &str,
    ) -> Arc<Self> {
        let real_name = format!("{}{}", config.resource_name_prefix, name);
        let topic = Arc::new(Self {
            name: name.to_string(),
            real_name,
            readiness: Readiness::new(format!("topic:{name}")),
            backend,
            config: config.clone(),
            error_sink,
        });

        let declaring = Arc::clone(&topic);
        tokio::spawn(async move { declaring.run_declaration().await });

        topic
    }

    async fn run_declaration(self: Arc<Self>) {
        self.readiness.advance(DeclarationState::Declaring);

        match self.backend.create_topic(&self.real_name).await {
            Ok(created) => {
                tracing::info!(topic = %self.name, locator = %created.locator, "topic ready");
                self.readiness
                    .advance(DeclarationState::Ready(created.locator));
            }
            Err(error) if error.is_already_exists() => {
                let address = format!("{}{}", self.config.topic_arn_prefix, self.real_name);
                match Locator::new(address) {
                    Ok(locator) => {
                        tracing::info!(topic = %self.name, locator = %locator, "topic already exists");
                        self.readiness.advance(DeclarationState::Ready(locator));
                    }
                    Err(validation) => self.fail_declaration(validation.to_string()),
                }
            }
            Err(error) => self.fail_declaration(error.to_string()),
        }
    }

    fn fail_declaration(&self, reason: String) {
        tracing::error!(topic = %self.name, reason = %reason, "topic declaration failed");
        self.error_sink.report(&MessengerError::Declaration {
            resource: format!("topic:{}", self.name),
            reason: reason.clone(),
        });
        self.readiness.advance(DeclarationState::Failed(reason));
    }

    /// Bind a queue to this topic so published messages are fanned out to it.
    ///
    /// Waits for the topic itself to settle, subscribes the queue's address
    /// under the queue protocol, and enables raw delivery so consumers see
    /// the published payload unchanged.
    pub async fn subscribe(&self, queue: &Queue) -> Result<SubscriptionRef, MessengerError> {
        let locator = self.wait_ready().await?;
        let subscription = self
            .backend
            .subscribe(&locator, SUBSCRIPTION_PROTOCOL, queue.arn())
            .await?;
        self.backend
            .set_subscription_attributes(&subscription, RAW_DELIVERY_ATTRIBUTE, "true")
            .await?;
        tracing::info!(
            topic = %self.name,
            queue = %queue.name(),
            subscription = %subscription,
            "queue bound to topic"
        );
        Ok(subscription)
    }

    /// Logical name the topic was declared under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend resource name, with the configured prefix applied
    pub fn real_name(&self) -> &str {
        &self.real_name
    }

    /// Current declaration state
    pub fn state(&self) -> DeclarationState {
        self.readiness.state()
    }

    /// Wait until the topic settles, returning its locator
    pub async fn wait_ready(&self) -> Result<Locator, MessengerError> {
        self.readiness.wait_ready().await
    }

    /// Wait until the topic settles, bounded by `limit`
    pub async fn wait_ready_timeout(&self, limit: Duration) -> Result<Locator, MessengerError> {
        self.readiness.wait_ready_timeout(limit).await
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("real_name", &self.real_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
