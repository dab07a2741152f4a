// ============================================================================
// Event Bus
// ============================================================================
//
// Two interchangeable implementations behind `EventBus`:
// - local:  in-process fire-and-forget fan-out, one task per handler
// - remote: broker-backed, one server stream per subscription
//
// `subscribe` returns a `Subscription` handle. Its id is the only way to
// unsubscribe; `closed()` resolves when the subscription ends and says why.
//
// ============================================================================

mod local;
mod remote;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use super::SubscriptionId;
use crate::context::{Context, ContextError};
use crate::event_sourcing::{Event, ExecutionMode};

pub use local::LocalEventBus;
pub use remote::RemoteEventBus;

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// `mode` says whether the event is happening now (LIVE) or being
    /// replayed (REPLAY). Side effects beyond the read model check it.
    async fn handle(&self, ctx: Context, mode: ExecutionMode, event: Event) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("broker transport error: {0}")]
    Transport(String),

    #[error("subscription stream for {0} ended")]
    StreamEnded(String),

    #[error("subscription cancelled: {0}")]
    Cancelled(ContextError),

    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("no subscription {id} for {event_type}")]
    NotSubscribed { event_type: String, id: SubscriptionId },

    #[error("event bus shut down")]
    Closed,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, ctx: &Context, mode: ExecutionMode, event: &Event) -> Result<(), EventBusError>;

    async fn subscribe(
        &self,
        ctx: &Context,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, EventBusError>;

    async fn unsubscribe(&self, ctx: &Context, event_type: &str, id: SubscriptionId) -> Result<(), EventBusError>;
}

/// Handle of one live subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    event_type: String,
    done: oneshot::Receiver<Result<(), EventBusError>>,
}

impl Subscription {
    pub(crate) fn new(event_type: &str) -> (Self, oneshot::Sender<Result<(), EventBusError>>) {
        let (tx, rx) = oneshot::channel();
        let subscription = Self {
            id: SubscriptionId::new(),
            event_type: event_type.to_string(),
            done: rx,
        };
        (subscription, tx)
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Waits until the subscription ends. `Ok` after an explicit
    /// unsubscribe, an error when the stream broke or the context ended.
    pub async fn closed(self) -> Result<(), EventBusError> {
        self.done.await.unwrap_or(Err(EventBusError::Closed))
    }
}

/// Adapts an async closure into an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Context, ExecutionMode, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f, _marker: PhantomData })
}

struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Context, ExecutionMode, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: Context, mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        (self.f)(ctx, mode, event).await
    }
}
