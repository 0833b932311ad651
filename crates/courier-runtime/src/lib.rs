//! # Courier Runtime
//!
//! Backend capability surface for SQS/SNS-shaped messaging providers, plus a
//! fully functional in-memory backend for tests and development.
//!
//! This library provides:
//! - A provider-agnostic [`QueueBackend`] trait covering queue and topic
//!   management, sends, long-poll receives, acknowledgement, and pub/sub fan-out
//! - Request/response types with validated identifiers
//! - Visibility-timeout and receive-count semantics in the in-memory backend
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all backend operations
//! - [`message`] - Message structures, receipt handles, and send/receive options
//! - [`resource`] - Resource locators and creation attributes
//! - [`backend`] - The backend trait
//! - [`memory`] - In-memory backend implementation

// Module declarations
pub mod backend;
pub mod error;
pub mod memory;
pub mod message;
pub mod resource;

// Re-export commonly used types at crate root for convenience
pub use backend::{QueueBackend, SharedBackend};
pub use error::{BackendError, ValidationError};
pub use memory::InMemoryBackend;
pub use message::{
    DeleteBatchEntry, MessageId, ReceiptHandle, ReceiveOptions, ReceivedMessage, SendBatchEntry,
    SendOptions, SentMessage,
};
pub use resource::{CreatedResource, Locator, QueueAttributes, SubscriptionRef};
