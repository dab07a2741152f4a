use std::sync::Arc;

use uuid::Uuid;

use super::core::{Event, EventRegistry, ExecutionMode};
use super::repository::RepositoryError;
use super::store::EventStore;
use crate::context::Context;
use crate::messaging::EventBus;

// ============================================================================
// Replayer - projection catch-up
// ============================================================================
//
// Reads stored events and republishes them with mode REPLAY, so handlers
// rebuild their read models without repeating LIVE-only side effects.
// Event types missing from the registry are skipped with a warning.
//
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub published: usize,
    pub skipped: usize,
}

pub struct Replayer {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    registry: Arc<EventRegistry>,
}

impl Replayer {
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>, registry: Arc<EventRegistry>) -> Self {
        Self { store, bus, registry }
    }

    /// Republishes every stored event. Backends without a global scan
    /// return `StoreError::Unsupported`.
    pub async fn replay_all(&self, ctx: &Context) -> Result<ReplayReport, RepositoryError> {
        let events = self.store.find_all().await?;
        self.republish(ctx, &events).await
    }

    pub async fn replay_stream(
        &self,
        ctx: &Context,
        stream_id: Uuid,
        stream_name: &str,
    ) -> Result<ReplayReport, RepositoryError> {
        let events = self.store.get_stream(stream_id, stream_name).await?;
        self.republish(ctx, &events).await
    }

    async fn republish(&self, ctx: &Context, events: &[Event]) -> Result<ReplayReport, RepositoryError> {
        let mut report = ReplayReport::default();

        for event in events {
            if let Some(reason) = ctx.err() {
                tracing::warn!(published = report.published, reason = %reason, "Replay interrupted");
                return Err(reason.into());
            }

            if let Err(err) = self.registry.decode(event) {
                tracing::warn!(event_type = %event.event_type, event_id = %event.id, error = %err, "Skipping event on replay");
                report.skipped += 1;
                continue;
            }

            self.bus.publish(ctx, ExecutionMode::REPLAY, event).await?;
            report.published += 1;
        }

        tracing::info!(published = report.published, skipped = report.skipped, "✅ Replay finished");
        Ok(report)
    }
}
