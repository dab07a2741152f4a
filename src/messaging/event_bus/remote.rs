use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};
use tonic::transport::Channel;
use tonic::Streaming;

use super::{EventBus, EventBusError, EventHandler, Subscription};
use crate::broker::pb::pub_sub_client::PubSubClient;
use crate::broker::pb::{PublishRequest, SubscribeRequest, SubscribeResponse};
use crate::context::Context;
use crate::event_sourcing::{Event, EventRegistry, ExecutionMode};
use crate::messaging::{Envelope, SubscriptionId};
use crate::metrics::Metrics;

// ============================================================================
// Remote Event Bus - broker-backed
// ============================================================================
//
// Topic = event type. Publish sends one JSON envelope per event; Subscribe
// opens a server stream and runs a receive loop that calls the handler
// inline, each call bounded by `handler_timeout`. A slow handler throttles
// only its own subscription.
//
// The loop stops on unsubscribe, on the subscribing context ending, or
// when the stream breaks. Recovery from a broken stream is the registrar's
// job; payloads published in between are lost.
//
// ============================================================================

type StopSignals = RwLock<HashMap<SubscriptionId, oneshot::Sender<()>>>;

pub struct RemoteEventBus {
    client: PubSubClient<Channel>,
    registry: Arc<EventRegistry>,
    handler_timeout: Duration,
    stops: Arc<StopSignals>,
    metrics: Option<Arc<Metrics>>,
}

impl RemoteEventBus {
    pub fn new(channel: Channel, registry: Arc<EventRegistry>, handler_timeout: Duration) -> Self {
        Self {
            client: PubSubClient::new(channel),
            registry,
            handler_timeout,
            stops: Arc::new(RwLock::new(HashMap::new())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Everything the receive loop needs, detached from the bus itself.
struct ReceiveLoop {
    event_type: String,
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    registry: Arc<EventRegistry>,
    handler_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl ReceiveLoop {
    async fn run(
        self,
        ctx: Context,
        mut stream: Streaming<SubscribeResponse>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<(), EventBusError> {
        let done = ctx.done();
        tokio::pin!(done);

        loop {
            tokio::select! {
                stopped = &mut stop => {
                    return stopped.map_err(|_| EventBusError::Closed);
                }
                reason = &mut done => {
                    return Err(EventBusError::Cancelled(reason));
                }
                message = stream.message() => match message {
                    Ok(Some(response)) => self.dispatch(&response.payload).await,
                    Ok(None) => return Err(EventBusError::StreamEnded(self.event_type.clone())),
                    Err(status) => return Err(EventBusError::Transport(status.to_string())),
                },
            }
        }
    }

    /// Decodes one payload and runs the handler under the timeout. Bad
    /// payloads and handler failures are logged; the loop keeps going.
    async fn dispatch(&self, payload: &[u8]) {
        let envelope = match Envelope::from_bytes(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(event_type = %self.event_type, error = %err, "Undecodable envelope skipped");
                return;
            }
        };

        if let Err(err) = self.registry.decode(&envelope.event) {
            tracing::warn!(event_type = %envelope.event.event_type, error = %err, "Unregistered event skipped");
            return;
        }

        let ctx = envelope.handler_context(self.handler_timeout);
        let mode = envelope.execution_mode;
        let event_id = envelope.event.id;
        tracing::debug!(event_type = %self.event_type, event_id = %event_id, mode = %mode, "[EventBus] Dispatch Event");

        let outcome = tokio::time::timeout(
            self.handler_timeout,
            self.handler.handle(ctx, mode, envelope.event),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("handler exceeded {:?}", self.handler_timeout),
        };
        tracing::warn!(
            event_type = %self.event_type,
            event_id = %event_id,
            subscription_id = %self.id,
            error = %failure,
            "Event handler failed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_handler_failure(&self.event_type);
        }
    }
}

#[async_trait]
impl EventBus for RemoteEventBus {
    async fn publish(&self, ctx: &Context, mode: ExecutionMode, event: &Event) -> Result<(), EventBusError> {
        let envelope = Envelope::new(ctx, mode, event.clone());
        let payload = envelope
            .to_bytes()
            .map_err(|e| EventBusError::Encode(e.to_string()))?;

        tracing::debug!(event_type = %event.event_type, event_id = %event.id, mode = %mode, "[EventBus] Publish");

        let request = PublishRequest {
            topic: event.event_type.clone(),
            payload,
        };
        if let Err(status) = self.client.clone().publish(request).await {
            tracing::error!(event_type = %event.event_type, error = %status, "[EventBus] Publish failed");
            return Err(EventBusError::Transport(status.to_string()));
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_event_published(&event.event_type, "remote");
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        ctx: &Context,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, EventBusError> {
        let request = SubscribeRequest {
            topic: event_type.to_string(),
        };
        let stream = self
            .client
            .clone()
            .subscribe(request)
            .await
            .map_err(|status| EventBusError::Transport(status.to_string()))?
            .into_inner();

        let (subscription, closed) = Subscription::new(event_type);
        let id = subscription.id();
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stops.write().await.insert(id, stop_tx);

        if let Some(metrics) = &self.metrics {
            metrics.subscription_opened();
        }
        tracing::info!(event_type, subscription_id = %id, "[EventBus] Subscribe");

        let receive_loop = ReceiveLoop {
            event_type: event_type.to_string(),
            id,
            handler,
            registry: self.registry.clone(),
            handler_timeout: self.handler_timeout,
            metrics: self.metrics.clone(),
        };
        let stops: Weak<StopSignals> = Arc::downgrade(&self.stops);
        let metrics = self.metrics.clone();
        let ctx = ctx.clone();
        let event_type = event_type.to_string();

        tokio::spawn(async move {
            let outcome = receive_loop.run(ctx, stream, stop_rx).await;

            if let Some(stops) = stops.upgrade() {
                stops.write().await.remove(&id);
            }
            if let Some(metrics) = metrics {
                metrics.subscription_closed();
            }
            match &outcome {
                Ok(()) => tracing::info!(event_type = %event_type, subscription_id = %id, "Subscription closed"),
                Err(err) => tracing::warn!(event_type = %event_type, subscription_id = %id, error = %err, "Subscription ended"),
            }
            let _ = closed.send(outcome);
        });

        Ok(subscription)
    }

    async fn unsubscribe(&self, _ctx: &Context, event_type: &str, id: SubscriptionId) -> Result<(), EventBusError> {
        match self.stops.write().await.remove(&id) {
            Some(stop) => {
                let _ = stop.send(());
                tracing::info!(event_type, subscription_id = %id, "[EventBus] Unsubscribe");
                Ok(())
            }
            None => Err(EventBusError::NotSubscribed {
                event_type: event_type.to_string(),
                id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::lazy_channel;
    use crate::messaging::event_bus::handler_fn;

    #[tokio::test]
    async fn test_publish_without_broker_is_transport_error() {
        let channel = lazy_channel("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        let bus = RemoteEventBus::new(channel, Arc::new(EventRegistry::new()), Duration::from_secs(1));

        let event = Event {
            id: uuid::Uuid::new_v4(),
            event_type: "test.Lost".into(),
            stream_id: uuid::Uuid::new_v4(),
            stream_name: "Nowhere".into(),
            stream_version: 0,
            occurred_at: chrono::Utc::now(),
            expires_at: None,
            payload: serde_json::json!({}),
            metadata: None,
        };
        let err = bus
            .publish(&Context::background(), ExecutionMode::LIVE, &event)
            .await
            .unwrap_err();
        assert!(matches!(err, EventBusError::Transport(_)));
    }

    #[tokio::test]
    async fn test_subscribe_without_broker_fails_fast() {
        let channel = lazy_channel("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        let bus = RemoteEventBus::new(channel, Arc::new(EventRegistry::new()), Duration::from_secs(1));

        let handler = handler_fn(|_ctx, _mode, _event| async { Ok(()) });
        let err = bus
            .subscribe(&Context::background(), "test.Lost", handler)
            .await
            .unwrap_err();
        assert!(matches!(err, EventBusError::Transport(_)));

        let unknown = SubscriptionId::new();
        assert!(bus.unsubscribe(&Context::background(), "test.Lost", unknown).await.is_err());
    }
}
