use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use super::core::{Aggregate, AggregateRoot, ExecutionMode, ReplayError};
use super::store::{EventStore, StoreError};
use crate::context::{Context, ContextError};
use crate::messaging::{EventBus, EventBusError};
use crate::metrics::Metrics;

// ============================================================================
// Aggregate Repository
// ============================================================================
//
// get:  load the stream -> empty is NotFound -> replay into an AggregateRoot
// save: store pending changes as one batch -> publish each, in order
//
// `save` is NOT atomic. A crash (or a bus failure) after the store step
// leaves events durably recorded that subscribers never saw; the Replayer
// is the catch-up path for that gap.
//
// ============================================================================

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("events stored but not published: {0}")]
    Publish(#[from] EventBusError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

pub struct Repository<A: Aggregate> {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    metrics: Option<Arc<Metrics>>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for Repository<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bus: self.bus.clone(),
            metrics: self.metrics.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A: Aggregate> Repository<A> {
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            metrics: None,
            _aggregate: PhantomData,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn get(&self, ctx: &Context, id: Uuid) -> Result<AggregateRoot<A>, RepositoryError> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        let events = self.store.get_stream(id, A::STREAM_NAME).await?;
        if events.is_empty() {
            return Err(StoreError::NotFound(format!("{} {}", A::STREAM_NAME, id)).into());
        }

        let root = AggregateRoot::<A>::from_history(&events)?;
        tracing::debug!(stream = A::STREAM_NAME, id = %id, version = root.version(), "Aggregate loaded");
        Ok(root)
    }

    /// Stores the pending changes, then publishes each of them with `mode`.
    /// Pending changes are consumed either way.
    pub async fn save(&self, ctx: &Context, mode: ExecutionMode, root: &mut AggregateRoot<A>) -> Result<(), RepositoryError> {
        let changes = root.take_changes();
        if changes.is_empty() {
            return Ok(());
        }
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        self.store.store(&changes).await?;
        if let Some(metrics) = &self.metrics {
            for event in &changes {
                metrics.record_event_stored(&event.event_type);
            }
        }

        for event in &changes {
            self.bus.publish(ctx, mode, event).await?;
        }

        tracing::info!(
            stream = A::STREAM_NAME,
            id = %root.id(),
            version = root.version(),
            event_count = changes.len(),
            mode = %mode,
            "✅ Aggregate saved"
        );
        Ok(())
    }
}
