//! Error types for backend operations.

use thiserror::Error;

/// Comprehensive error type for all backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Resource already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Resource not found: {locator}")]
    NotFound { locator: String },

    #[error("Message not found or receipt expired: {receipt}")]
    InvalidReceipt { receipt: String },

    #[error("Subscription not found: {reference}")]
    SubscriptionNotFound { reference: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Batch size {size} exceeds maximum {max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Backend error: {code} - {message}")]
    Backend { code: String, message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl BackendError {
    /// Check if this error reports that the resource being created already
    /// exists, in which case creation callers may treat the operation as
    /// having succeeded earlier.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Check if error is transient and the operation may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AlreadyExists { .. } => false,
            Self::NotFound { .. } => false,
            Self::InvalidReceipt { .. } => false,
            Self::SubscriptionNotFound { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::BatchTooLarge { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::Backend { .. } => true,
            Self::Validation(_) => false,
        }
    }
}

/// Validation errors for identifiers and request parameters
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
