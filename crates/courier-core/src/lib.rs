//! # Courier Core
//!
//! At-least-once message consumption and resource lifecycle orchestration
//! over any [`courier_runtime::QueueBackend`].
//!
//! This library provides:
//! - Background declaration of queues and topics with readiness tracking,
//!   including dead-letter queues wired up through redrive policies
//! - Consumers that long-poll, dispatch to async handlers, and acknowledge
//!   only what the handler completed
//! - A producer that envelopes JSON payloads and sends to queues or
//!   publishes to topics
//! - A [`Messenger`] tying registries, consumers, and the producer together
//!
//! ## Module Organization
//!
//! - [`config`] - Naming configuration applied to declared resources
//! - [`error`] - Error types and the error sink for consumer-side failures
//! - [`readiness`] - Declaration state machine and readiness waiting
//! - [`policy`] - Access and redrive policy documents
//! - [`handler`] - Message and batch handler traits
//! - [`queue`] / [`topic`] - Declared resources
//! - [`consumer`] - The receive loop
//! - [`producer`] - Enveloped sends and publishes
//! - [`messenger`] - The top-level orchestrator

// Module declarations
pub mod config;
pub mod consumer;
pub mod error;
pub mod handler;
pub mod messenger;
pub mod policy;
pub mod producer;
pub mod queue;
pub mod readiness;
pub mod topic;

// Re-export commonly used types at crate root for convenience
pub use config::MessengerConfig;
pub use consumer::{Consumer, ConsumerOptions};
pub use error::{ErrorSink, LoggingErrorSink, MessengerError, SharedErrorSink};
pub use handler::{BatchHandler, MessageHandler};
pub use messenger::{CreateQueueOptions, Messenger};
pub use producer::Producer;
pub use queue::{Queue, QueueOptions};
pub use readiness::{DeclarationState, Readiness};
pub use topic::Topic;

// The runtime types callers interact with directly
pub use courier_runtime::{Locator, SendOptions, SentMessage};
