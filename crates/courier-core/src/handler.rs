//! Handler seams for message consumption.
//!
//! Both traits have blanket implementations for async closures, so plain
//! functions work anywhere a handler is expected:
//!
//! ```rust,no_run
//! # use serde_json::Value;
//! let handler = |payload: Value| async move {
//!     println!("{payload}");
//!     anyhow::Ok(())
//! };
//! # let _ = handler;
//! ```
//!
//! Returning an error leaves the message unacknowledged so the backend
//! redelivers it after the visibility timeout.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Processes one decoded message payload at a time
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: Value) -> anyhow::Result<()> {
        self(payload).await
    }
}

/// Processes a whole received batch in one call.
///
/// Success acknowledges every message in the batch; failure acknowledges
/// none of them.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, payloads: Vec<Value>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> BatchHandler for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle_batch(&self, payloads: Vec<Value>) -> anyhow::Result<()> {
        self(payloads).await
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
