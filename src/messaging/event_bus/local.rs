use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};

use super::{EventBus, EventBusError, EventHandler, Subscription};
use crate::context::Context;
use crate::event_sourcing::{Event, ExecutionMode};
use crate::messaging::SubscriptionId;
use crate::metrics::Metrics;

// ============================================================================
// Local Event Bus - in-process fan-out
// ============================================================================
//
// `publish` snapshots the handlers of the event type under the read lock
// and launches one detached task per handler. No acknowledgment, no
// ordering across handlers, no redelivery. Handler tasks do not inherit
// cancellation from the publisher.
//
// A subscription ends on `unsubscribe` or when the context it was opened
// with is cancelled.
//
// ============================================================================

struct Entry {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    stop: oneshot::Sender<()>,
}

type Handlers = RwLock<HashMap<String, Vec<Entry>>>;

#[derive(Default)]
pub struct LocalEventBus {
    handlers: Arc<Handlers>,
    metrics: Option<Arc<Metrics>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().await.get(event_type).map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub(crate) async fn first_subscription(&self, event_type: &str) -> Option<SubscriptionId> {
        self.handlers
            .read()
            .await
            .get(event_type)
            .and_then(|entries| entries.first())
            .map(|e| e.id)
    }
}

async fn remove_entry(handlers: &Handlers, event_type: &str, id: SubscriptionId) -> Option<Entry> {
    let mut handlers = handlers.write().await;
    let entries = handlers.get_mut(event_type)?;
    let position = entries.iter().position(|e| e.id == id)?;
    let entry = entries.remove(position);
    if entries.is_empty() {
        handlers.remove(event_type);
    }
    Some(entry)
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, ctx: &Context, mode: ExecutionMode, event: &Event) -> Result<(), EventBusError> {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .await
            .get(&event.event_type)
            .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default();

        tracing::debug!(
            event_type = %event.event_type,
            event_id = %event.id,
            mode = %mode,
            handlers = handlers.len(),
            "[EventBus|Publish]"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_event_published(&event.event_type, "local");
        }

        for handler in handlers {
            let ctx = ctx.clone();
            let event = event.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                let event_type = event.event_type.clone();
                if let Err(err) = handler.handle(ctx, mode, event).await {
                    tracing::warn!(event_type = %event_type, error = %err, "Event handler failed");
                    if let Some(metrics) = metrics {
                        metrics.record_handler_failure(&event_type);
                    }
                }
            });
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        ctx: &Context,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, EventBusError> {
        let (subscription, closed) = Subscription::new(event_type);
        let id = subscription.id();
        let (stop_tx, stop_rx) = oneshot::channel();

        self.handlers
            .write()
            .await
            .entry(event_type.to_string())
            .or_default()
            .push(Entry { id, handler, stop: stop_tx });

        if let Some(metrics) = &self.metrics {
            metrics.subscription_opened();
        }
        tracing::info!(event_type, subscription_id = %id, "[EventBus|Subscribe]");

        let handlers: Weak<Handlers> = Arc::downgrade(&self.handlers);
        let metrics = self.metrics.clone();
        let ctx = ctx.clone();
        let event_type = event_type.to_string();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                stopped = stop_rx => stopped.map_err(|_| EventBusError::Closed),
                reason = ctx.done() => {
                    if let Some(handlers) = handlers.upgrade() {
                        remove_entry(&handlers, &event_type, id).await;
                    }
                    tracing::info!(event_type = %event_type, subscription_id = %id, reason = %reason, "Subscription context ended");
                    Err(EventBusError::Cancelled(reason))
                }
            };

            if let Some(metrics) = metrics {
                metrics.subscription_closed();
            }
            let _ = closed.send(outcome);
        });

        Ok(subscription)
    }

    async fn unsubscribe(&self, _ctx: &Context, event_type: &str, id: SubscriptionId) -> Result<(), EventBusError> {
        match remove_entry(&self.handlers, event_type, id).await {
            Some(entry) => {
                let _ = entry.stop.send(());
                tracing::info!(event_type, subscription_id = %id, "[EventBus|Unsubscribe]");
                Ok(())
            }
            None => Err(EventBusError::NotSubscribed {
                event_type: event_type.to_string(),
                id,
            }),
        }
    }
}
