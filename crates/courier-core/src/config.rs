//! Naming and addressing configuration for a messenger instance.

/// Configuration shared by all queues, topics, and producers created through
/// one [`Messenger`](crate::messenger::Messenger).
///
/// The prefixes control how logical names map to backend resources:
/// `resource_name_prefix` is prepended to every declared name, while the arn
/// and locator prefixes describe the backend's addressing scheme so
/// addresses can be computed without a backend round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessengerConfig {
    /// Prefix prepended to logical queue and topic names, typically per
    /// environment (for example `staging_`)
    pub resource_name_prefix: String,
    /// Address prefix for queue arns (for example `arn:sqs:us-east-1:`)
    pub queue_arn_prefix: String,
    /// Address prefix for topic arns (for example `arn:sns:us-east-1:`)
    pub topic_arn_prefix: String,
    /// Prefix for queue locators, used to reconstruct the locator of a queue
    /// that already exists (for example `https://queue.example.com/`)
    pub queue_locator_prefix: String,
}

impl MessengerConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logical resource name prefix
    pub fn with_resource_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_name_prefix = prefix.into();
        self
    }

    /// Set the queue arn prefix
    pub fn with_queue_arn_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_arn_prefix = prefix.into();
        self
    }

    /// Set the topic arn prefix
    pub fn with_topic_arn_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_arn_prefix = prefix.into();
        self
    }

    /// Set the queue locator prefix
    pub fn with_queue_locator_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_locator_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
