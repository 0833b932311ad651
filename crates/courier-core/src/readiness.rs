//! One-shot readiness state for declared resources.

use crate::error::MessengerError;
use courier_runtime::Locator;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of an asynchronously declared resource.
///
/// The state advances `Pending` → `Declaring` → `Ready` or `Failed`. The
/// terminal states are settled exactly once and never overwritten; the
/// resolved locator travels inside `Ready` so it is written in the same step
/// that publishes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationState {
    /// Declaration has not started yet
    Pending,
    /// The backend call is in flight
    Declaring,
    /// The resource exists, addressed by the contained locator
    Ready(Locator),
    /// Declaration failed with the contained reason
    Failed(String),
}

impl DeclarationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready(_) | Self::Failed(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Holder for one resource's [`DeclarationState`].
///
/// Observers that subscribe after the state has settled resolve immediately;
/// there is no registration window to miss.
#[derive(Debug)]
pub struct Readiness {
    resource: String,
    state: watch::Sender<DeclarationState>,
}

impl Readiness {
    /// Create a new holder in the `Pending` state. `resource` names the
    /// owner in errors, for example `queue:orders`.
    pub fn new(resource: impl Into<String>) -> Self {
        let (state, _) = watch::channel(DeclarationState::Pending);
        Self {
            resource: resource.into(),
            state,
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> DeclarationState {
        self.state.borrow().clone()
    }

    /// Advance the state. Once a terminal state is set, later calls are
    /// ignored.
    pub(crate) fn advance(&self, next: DeclarationState) {
        self.state.send_modify(|state| {
            if !state.is_terminal() {
                *state = next;
            }
        });
    }

    /// Wait until the resource settles, returning its locator on success.
    ///
    /// Resolves immediately when the state is already terminal. A failed
    /// declaration yields [`MessengerError::Declaration`].
    pub async fn wait_ready(&self) -> Result<Locator, MessengerError> {
        let mut receiver = self.state.subscribe();
        loop {
            match &*receiver.borrow_and_update() {
                DeclarationState::Ready(locator) => return Ok(locator.clone()),
                DeclarationState::Failed(reason) => {
                    return Err(MessengerError::Declaration {
                        resource: self.resource.clone(),
                        reason: reason.clone(),
                    });
                }
                DeclarationState::Pending | DeclarationState::Declaring => {}
            }

            if receiver.changed().await.is_err() {
                return Err(MessengerError::Declaration {
                    resource: self.resource.clone(),
                    reason: "declaration abandoned before settling".to_string(),
                });
            }
        }
    }

    /// Wait until the resource settles, but at most `limit`.
    ///
    /// Expiry yields [`MessengerError::ResourceNotReady`] without touching
    /// the underlying state.
    pub async fn wait_ready_timeout(&self, limit: Duration) -> Result<Locator, MessengerError> {
        match tokio::time::timeout(limit, self.wait_ready()).await {
            Ok(result) => result,
            Err(_) => Err(MessengerError::ResourceNotReady {
                resource: self.resource.clone(),
                waited_ms: limit.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod tests;
