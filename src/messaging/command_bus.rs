use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::{oneshot, RwLock};

use super::SubscriptionId;
use crate::context::Context;
use crate::error::AppError;
use crate::metrics::Metrics;

// ============================================================================
// Command Bus
// ============================================================================
//
// Named dispatch with a single handler slot per command name: the last
// `subscribe` for a name replaces the previous handler. `publish` fails
// synchronously when nothing is registered, otherwise the handler runs as
// its own task and reports its outcome on the caller's oneshot.
//
// The bus never enforces a deadline; `dispatch` races the result against
// the caller's context.
//
// ============================================================================

pub trait Command: Send + Sync + fmt::Debug + 'static {
    /// Dispatch key, e.g. "client.Create".
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    async fn handle(&self, ctx: Context, command: C) -> Result<(), AppError>;
}

#[derive(Debug, Error)]
pub enum CommandBusError {
    #[error("no handler subscribed for command {0}")]
    HandlerNotFound(String),

    #[error("handler for {0} ended without reporting a result")]
    ResultDropped(String),
}

type ErasedHandler =
    Arc<dyn Fn(Context, Box<dyn Any + Send>) -> BoxFuture<'static, Result<(), AppError>> + Send + Sync>;

struct Slot {
    id: SubscriptionId,
    handler: ErasedHandler,
}

#[derive(Default)]
pub struct CommandBus {
    handlers: RwLock<HashMap<String, Slot>>,
    metrics: Option<Arc<Metrics>>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Installs `handler` for `name`, replacing any previous one.
    pub async fn subscribe<C, H>(&self, name: &str, handler: H) -> SubscriptionId
    where
        C: Command,
        H: CommandHandler<C>,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: Context, command: Box<dyn Any + Send>| {
            let handler = handler.clone();
            async move {
                let command = command.downcast::<C>().map_err(|_| {
                    AppError::Internal(format!(
                        "command routed to a handler of {}",
                        std::any::type_name::<C>()
                    ))
                })?;
                handler.handle(ctx, *command).await
            }
            .boxed()
        });

        let id = SubscriptionId::new();
        let previous = self
            .handlers
            .write()
            .await
            .insert(name.to_string(), Slot { id, handler: erased });

        if previous.is_some() {
            tracing::warn!(command = name, "Command handler replaced");
        } else {
            tracing::info!(command = name, "✅ Command handler subscribed");
        }
        id
    }

    /// Removes the handler for `name` if `id` still owns the slot.
    pub async fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().await;
        match handlers.get(name) {
            Some(slot) if slot.id == id => {
                handlers.remove(name);
                tracing::info!(command = name, "Command handler unsubscribed");
                true
            }
            _ => false,
        }
    }

    pub async fn is_subscribed(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    /// Hands `command` to its handler. The terminal result arrives on `out`.
    pub async fn publish<C: Command>(
        &self,
        ctx: &Context,
        command: C,
        out: oneshot::Sender<Result<(), AppError>>,
    ) -> Result<(), CommandBusError> {
        let name = command.name();
        let handler = self
            .handlers
            .read()
            .await
            .get(name)
            .map(|slot| slot.handler.clone());

        let Some(handler) = handler else {
            tracing::warn!(command = name, "No handler for command");
            return Err(CommandBusError::HandlerNotFound(name.to_string()));
        };

        tracing::debug!(command = name, payload = ?command, "Publishing command");

        let ctx = ctx.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = handler(ctx, Box::new(command)).await;

            if let Err(err) = &result {
                tracing::warn!(command = name, error = %err, "Command failed");
            }
            if let Some(metrics) = metrics {
                metrics.record_command(
                    name,
                    started.elapsed().as_secs_f64(),
                    result.as_ref().err().map(AppError::kind),
                );
            }

            // the caller may have stopped waiting
            let _ = out.send(result);
        });

        Ok(())
    }

    /// Publishes and waits for the result or for `ctx` to end, whichever
    /// comes first.
    pub async fn dispatch<C: Command>(&self, ctx: &Context, command: C) -> Result<(), AppError> {
        let name = command.name();
        let (tx, rx) = oneshot::channel();
        self.publish(ctx, command, tx).await?;

        tokio::select! {
            result = rx => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(CommandBusError::ResultDropped(name.to_string()).into()),
            },
            reason = ctx.done() => Err(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Ping {
        reply: Result<(), AppError>,
    }

    impl Command for Ping {
        fn name(&self) -> &'static str {
            "test.Ping"
        }
    }

    #[derive(Default, Clone)]
    struct Counting {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl CommandHandler<Ping> for Counting {
        async fn handle(&self, _ctx: Context, command: Ping) -> Result<(), AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            command.reply
        }
    }

    struct Sleepy;

    #[async_trait]
    impl CommandHandler<Ping> for Sleepy {
        async fn handle(&self, _ctx: Context, _command: Ping) -> Result<(), AppError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    struct Panicky;

    #[async_trait]
    impl CommandHandler<Ping> for Panicky {
        async fn handle(&self, _ctx: Context, _command: Ping) -> Result<(), AppError> {
            panic!("handler bug");
        }
    }

    #[tokio::test]
    async fn test_subscribe_publish() {
        let bus = CommandBus::new();
        let handler = Counting::default();
        bus.subscribe("test.Ping", handler.clone()).await;

        let (tx, rx) = oneshot::channel();
        bus.publish(&Context::background(), Ping { reply: Ok(()) }, tx)
            .await
            .unwrap();

        assert_eq!(rx.await.unwrap(), Ok(()));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_fails_without_running_anything() {
        let bus = CommandBus::new();
        let handler = Counting::default();
        bus.subscribe("test.Other", handler.clone()).await;

        let (tx, _rx) = oneshot::channel();
        let err = bus
            .publish(&Context::background(), Ping { reply: Ok(()) }, tx)
            .await
            .unwrap_err();

        assert!(matches!(err, CommandBusError::HandlerNotFound(name) if name == "test.Ping"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_reported() {
        let bus = CommandBus::new();
        bus.subscribe("test.Ping", Counting::default()).await;

        let result = bus
            .dispatch(&Context::background(), Ping { reply: Err(AppError::Forbidden("nope".into())) })
            .await;
        assert_eq!(result, Err(AppError::Forbidden("nope".into())));
    }

    #[tokio::test]
    async fn test_unsubscribe_requires_owning_handle() {
        let bus = CommandBus::new();
        let first = bus.subscribe("test.Ping", Counting::default()).await;
        let second = bus.subscribe("test.Ping", Counting::default()).await;

        // the replaced handle no longer owns the slot
        assert!(!bus.unsubscribe("test.Ping", first).await);
        assert!(bus.is_subscribed("test.Ping").await);

        assert!(bus.unsubscribe("test.Ping", second).await);
        let result = bus.dispatch(&Context::background(), Ping { reply: Ok(()) }).await;
        assert!(matches!(result, Err(AppError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_last_subscribe_wins() {
        let bus = CommandBus::new();
        let old = Counting::default();
        let new = Counting::default();
        bus.subscribe("test.Ping", old.clone()).await;
        bus.subscribe("test.Ping", new.clone()).await;

        bus.dispatch(&Context::background(), Ping { reply: Ok(()) })
            .await
            .unwrap();
        assert_eq!(old.calls.load(Ordering::SeqCst), 0);
        assert_eq!(new.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_respects_deadline() {
        let bus = CommandBus::new();
        bus.subscribe("test.Ping", Sleepy).await;

        let ctx = Context::background().with_timeout(Duration::from_millis(30));
        let result = bus.dispatch(&ctx, Ping { reply: Ok(()) }).await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_panicking_handler_reports_internal() {
        let bus = CommandBus::new();
        bus.subscribe("test.Ping", Panicky).await;

        let result = bus.dispatch(&Context::background(), Ping { reply: Ok(()) }).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let bus = CommandBus::new().with_metrics(metrics.clone());
        bus.subscribe("test.Ping", Counting::default()).await;

        bus.dispatch(&Context::background(), Ping { reply: Ok(()) })
            .await
            .unwrap();

        let dispatched = metrics
            .commands_dispatched
            .with_label_values(&["test.Ping"])
            .get();
        assert_eq!(dispatched, 1);
    }
}
