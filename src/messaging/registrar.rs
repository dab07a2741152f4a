use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use super::event_bus::{EventBus, EventBusError, EventHandler};
use crate::context::Context;
use crate::health::HealthProbe;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Resilient Subscription Registrar
// ============================================================================
//
// 1. Retries the broker health check (unbounded attempts) until SERVING,
//    bounded only by `setup_timeout`. Timing out is fatal to startup.
// 2. Spawns one task per event type. Each task subscribes, waits for the
//    subscription to end, backs off and subscribes again, for as long as
//    the registering context lives. A clean stream end is retried too.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    pub setup_timeout: Duration,
    pub resubscribe_delay: Duration,
    pub max_resubscribe_delay: Duration,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            setup_timeout: Duration::from_secs(5),
            resubscribe_delay: Duration::from_millis(200),
            max_resubscribe_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("{service} connection not serving after {timeout:?}")]
    NotServing { service: String, timeout: Duration },
}

pub struct Registrar {
    bus: Arc<dyn EventBus>,
    probe: HealthProbe,
    config: RegistrarConfig,
}

impl Registrar {
    pub fn new(bus: Arc<dyn EventBus>, probe: HealthProbe, config: RegistrarConfig) -> Self {
        Self { bus, probe, config }
    }

    /// Waits for the broker, then keeps one subscription per entry of
    /// `handlers` alive until `ctx` ends.
    pub async fn register(
        &self,
        ctx: &Context,
        handlers: HashMap<String, Arc<dyn EventHandler>>,
    ) -> Result<Vec<JoinHandle<()>>, RegistrarError> {
        self.wait_until_serving().await?;

        let tasks = handlers
            .into_iter()
            .map(|(event_type, handler)| {
                let bus = self.bus.clone();
                let ctx = ctx.clone();
                let backoff = RetryConfig::unbounded(
                    self.config.resubscribe_delay,
                    self.config.max_resubscribe_delay,
                );
                tokio::spawn(keep_subscribed(bus, ctx, event_type, handler, backoff))
            })
            .collect::<Vec<_>>();

        tracing::info!(subscriptions = tasks.len(), "✅ Event handlers registered");
        Ok(tasks)
    }

    async fn wait_until_serving(&self) -> Result<(), RegistrarError> {
        let backoff = RetryConfig::unbounded(Duration::from_millis(50), Duration::from_secs(1));
        let probe = &self.probe;

        let waited = tokio::time::timeout(
            self.config.setup_timeout,
            retry_with_backoff(backoff, move |_attempt| async move {
                if probe.is_serving().await {
                    Ok(())
                } else {
                    Err(format!("{} gRPC connection is not serving", probe.service()))
                }
            }),
        )
        .await;

        match waited {
            Ok(RetryResult::Success(())) => {
                tracing::info!(service = probe.service(), "✅ Broker connection serving");
                Ok(())
            }
            Ok(RetryResult::Failed(_)) | Err(_) => {
                tracing::error!(
                    service = probe.service(),
                    timeout = ?self.config.setup_timeout,
                    "❌ Broker connection never became serving"
                );
                Err(RegistrarError::NotServing {
                    service: probe.service().to_string(),
                    timeout: self.config.setup_timeout,
                })
            }
        }
    }
}

async fn keep_subscribed(
    bus: Arc<dyn EventBus>,
    ctx: Context,
    event_type: String,
    handler: Arc<dyn EventHandler>,
    backoff: RetryConfig,
) {
    loop {
        let (bus_ref, ctx_ref, topic, handler_ref) = (&bus, &ctx, event_type.as_str(), &handler);
        let subscribe = move |_attempt| bus_ref.subscribe(ctx_ref, topic, handler_ref.clone());
        let subscribed = tokio::select! {
            result = retry_with_backoff(backoff.clone(), subscribe) => result,
            _ = ctx.done() => return,
        };
        let subscription = match subscribed {
            RetryResult::Success(subscription) => subscription,
            RetryResult::Failed(err) => {
                tracing::error!(event_type = %event_type, error = %err, "Subscribe gave up");
                return;
            }
        };

        let ended = subscription.closed().await;
        if ctx.err().is_some() {
            return;
        }
        match ended {
            Ok(()) => tracing::warn!(event_type = %event_type, "Event handler unsubscribed, resubscribing"),
            Err(EventBusError::Cancelled(_)) => return,
            Err(err) => tracing::warn!(event_type = %event_type, error = %err, "Event handler unsubscribed, resubscribing"),
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff.initial_delay) => {}
            _ = ctx.done() => return,
        }
    }
}
