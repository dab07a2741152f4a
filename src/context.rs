use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

// ============================================================================
// Call Context
// ============================================================================
//
// Threaded through every public operation of the runtime:
// - who is calling (identity)
// - where the request came from (request metadata)
// - how long the caller is willing to wait (deadline)
// - whether the caller gave up (cancellation)
//
// Clones share the cancellation signal of the context they came from.
//
// ============================================================================

/// Authenticated actor on whose behalf a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
}

impl Identity {
    pub fn user(user_id: Uuid) -> Self {
        Self { user_id, client_id: None }
    }
}

/// Transport-level facts about the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

impl RequestMetadata {
    pub fn is_empty(&self) -> bool {
        self.trace_id.is_none()
            && self.ip_address.is_none()
            && self.user_agent.is_none()
            && self.remote_addr.is_none()
            && self.referer.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    identity: Option<Identity>,
    metadata: Option<RequestMetadata>,
    deadline: Option<Instant>,
    cancel_signals: Vec<watch::Receiver<bool>>,
}

/// Cancels every context derived from the one it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// Empty context: no identity, no deadline, never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Tightens the deadline; an earlier existing deadline wins.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel_signals.push(rx);
        (self, CancelHandle { tx })
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn metadata(&self) -> Option<&RequestMetadata> {
        self.metadata.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Non-blocking check of the cancellation state.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel_signals.iter().any(|rx| *rx.borrow()) {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    /// Never resolves for a background context.
    pub async fn done(&self) -> ContextError {
        let mut waiters: Vec<BoxFuture<'static, ContextError>> = Vec::new();

        for rx in &self.cancel_signals {
            let mut rx = rx.clone();
            waiters.push(
                async move {
                    loop {
                        if *rx.borrow_and_update() {
                            return ContextError::Cancelled;
                        }
                        if rx.changed().await.is_err() {
                            // handle dropped without cancelling
                            return future::pending().await;
                        }
                    }
                }
                .boxed(),
            );
        }

        if let Some(deadline) = self.deadline {
            waiters.push(
                async move {
                    tokio::time::sleep_until(deadline).await;
                    ContextError::DeadlineExceeded
                }
                .boxed(),
            );
        }

        if waiters.is_empty() {
            return future::pending().await;
        }

        let (reason, _, _) = future::select_all(waiters).await;
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_resolves_done() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_is_shared_by_clones() {
        let (ctx, handle) = Context::background().with_cancel();
        let clone = ctx.clone();
        assert!(clone.err().is_none());

        let waiter = tokio::spawn(async move { clone.done().await });
        handle.cancel();

        assert_eq!(waiter.await.unwrap(), ContextError::Cancelled);
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_earlier_deadline_wins() {
        let ctx = Context::background()
            .with_timeout(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(60));
        assert!(ctx.remaining().unwrap() <= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_background_never_done() {
        let ctx = Context::background();
        let res = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(res.is_err());
    }

    #[test]
    fn test_metadata_emptiness() {
        assert!(RequestMetadata::default().is_empty());
        let meta = RequestMetadata {
            ip_address: Some("10.0.0.1".into()),
            ..Default::default()
        };
        assert!(!meta.is_empty());
    }
}
