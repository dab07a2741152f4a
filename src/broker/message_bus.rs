use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::messaging::SubscriptionId;
use crate::metrics::Metrics;

// ============================================================================
// Broker Message Bus
// ============================================================================
//
// Each subscriber owns a bounded queue. Publishing never waits: a full
// queue loses that payload for that subscriber, a closed queue (client
// gone) removes the subscriber.
//
// ============================================================================

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<Vec<u8>>,
}

pub struct MessageBus {
    topics: RwLock<HashMap<String, Vec<Subscriber>>>,
    queue_size: usize,
    metrics: Option<Arc<Metrics>>,
}

impl MessageBus {
    pub fn new(queue_size: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            queue_size: queue_size.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn subscribe(&self, topic: &str) -> (SubscriptionId, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let id = SubscriptionId::new();

        let mut topics = self.topics.write().await;
        let subscribers = topics.entry(topic.to_string()).or_default();
        subscribers.push(Subscriber { id, tx });
        self.record_subscribers(topic, subscribers.len());

        tracing::info!(topic, subscription_id = %id, "[MessageBus] Subscribe");
        (id, rx)
    }

    pub async fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.retain(|s| s.id != id);
            self.record_subscribers(topic, subscribers.len());
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
        tracing::info!(topic, subscription_id = %id, "[MessageBus] Unsubscribe");
    }

    /// Forwards `payload` to every subscriber of `topic`. Returns how many
    /// subscribers accepted it.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> usize {
        if let Some(metrics) = &self.metrics {
            metrics.record_broker_message(topic);
        }

        let mut gone = Vec::new();
        let mut delivered = 0;
        {
            let topics = self.topics.read().await;
            let Some(subscribers) = topics.get(topic) else {
                tracing::debug!(topic, "[MessageBus] Publish without subscribers");
                return 0;
            };

            for subscriber in subscribers {
                match subscriber.tx.try_send(payload.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(topic, subscription_id = %subscriber.id, "Subscriber queue full, payload dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => gone.push(subscriber.id),
                }
            }
        }

        for id in gone {
            self.unsubscribe(topic, id).await;
        }

        tracing::debug!(topic, delivered, "[MessageBus] Publish");
        delivered
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map_or(0, Vec::len)
    }

    /// Drops every subscriber of `topic`, ending their streams.
    pub async fn close(&self, topic: &str) {
        if self.topics.write().await.remove(topic).is_some() {
            self.record_subscribers(topic, 0);
            tracing::info!(topic, "[MessageBus] Close");
        }
    }

    fn record_subscribers(&self, topic: &str, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.record_broker_subscribers(topic, count);
        }
    }
}
