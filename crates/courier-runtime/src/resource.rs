//! Resource locators and creation attributes.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Opaque address of a queue or topic as issued by the backend.
///
/// For SQS-shaped backends this is the queue URL; for SNS-shaped topics it is
/// the topic ARN. The orchestration layer never interprets the contents, it
/// only passes locators back into backend operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    /// Create new locator with validation
    pub fn new(locator: String) -> Result<Self, ValidationError> {
        if locator.is_empty() {
            return Err(ValidationError::Required {
                field: "locator".to_string(),
            });
        }

        Ok(Self(locator))
    }

    /// Get locator as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Locator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Opaque reference to a topic subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionRef(String);

impl SubscriptionRef {
    /// Create new subscription reference with validation
    pub fn new(reference: String) -> Result<Self, ValidationError> {
        if reference.is_empty() {
            return Err(ValidationError::Required {
                field: "subscription_ref".to_string(),
            });
        }

        Ok(Self(reference))
    }

    /// Get reference as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attributes applied when creating a queue.
///
/// All fields are optional; a bare create (all `None`) takes the backend's
/// defaults. Timeouts and delays are in seconds. Policy documents are opaque
/// JSON strings assembled by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAttributes {
    /// Maximum accepted message size in bytes
    pub max_message_size: Option<u64>,
    /// Visibility timeout applied to received messages
    pub visibility_timeout: Option<u32>,
    /// Default delivery delay for sent messages
    pub delay_seconds: Option<u32>,
    /// Access policy document (JSON)
    pub policy: Option<String>,
    /// Redrive policy document (JSON) pointing at a dead-letter queue
    pub redrive_policy: Option<String>,
}

impl QueueAttributes {
    /// Create new attributes with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum message size in bytes
    pub fn with_max_message_size(mut self, size: u64) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Set visibility timeout in seconds
    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    /// Set default delivery delay in seconds
    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    /// Set access policy document
    pub fn with_policy(mut self, policy: String) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set redrive policy document
    pub fn with_redrive_policy(mut self, redrive_policy: String) -> Self {
        self.redrive_policy = Some(redrive_policy);
        self
    }
}

/// Result of creating a queue or topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    /// Locator issued by the backend for the new resource
    pub locator: Locator,
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
