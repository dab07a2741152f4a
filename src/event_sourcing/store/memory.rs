use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{plan_append, EventStore, StoreError};
use crate::event_sourcing::core::Event;

// ============================================================================
// In-Memory Event Store
// ============================================================================
//
// Position in `events` is the surrogate sequence: it preserves arrival
// order even when `occurred_at` collides. The version check and the append
// happen under one write lock, so a rejected batch leaves nothing behind.
//
// ============================================================================

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    by_id: HashMap<Uuid, usize>,
    heads: HashMap<(Uuid, String), i64>,
}

#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn store(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let plan = plan_append(events)?;

        let mut inner = self.inner.write().await;

        if let Some(dup) = events.iter().find(|e| inner.by_id.contains_key(&e.id)) {
            return Err(StoreError::DuplicateEvent(dup.id));
        }

        for append in &plan {
            let key = (append.stream_id, append.stream_name.clone());
            let head = inner.heads.get(&key).copied().unwrap_or(0);
            if head != append.expected_version {
                return Err(StoreError::VersionConflict {
                    stream_id: append.stream_id,
                    stream_name: append.stream_name.clone(),
                    expected: append.expected_version,
                    actual: head,
                });
            }
        }

        for event in events {
            let position = inner.events.len();
            inner.by_id.insert(event.id, position);
            inner
                .heads
                .insert((event.stream_id, event.stream_name.clone()), event.stream_version + 1);
            inner.events.push(event.clone());
        }

        tracing::debug!(event_count = events.len(), streams = plan.len(), "Stored events in memory");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Event, StoreError> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .get(&id)
            .map(|&position| inner.events[position].clone())
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")))
    }

    async fn find_all(&self) -> Result<Vec<Event>, StoreError> {
        Ok(self.inner.read().await.events.clone())
    }

    async fn get_stream(&self, stream_id: Uuid, stream_name: &str) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.stream_id == stream_id && e.stream_name == stream_name)
            .cloned()
            .collect())
    }

    async fn get_stream_events_by_type(
        &self,
        stream_id: Uuid,
        stream_name: &str,
        event_type: &str,
    ) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| {
                e.stream_id == stream_id && e.stream_name == stream_name && e.event_type == event_type
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::store::tests::noted;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_and_get() {
        let store = InMemoryEventStore::new();
        let stream = Uuid::new_v4();
        let event = noted(stream, 0);

        store.store(std::slice::from_ref(&event)).await.unwrap();

        assert_eq!(store.get(event.id).await.unwrap(), event);
        assert!(matches!(store.get(Uuid::new_v4()).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = InMemoryEventStore::new();
        store.store(&[]).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_without_side_effects() {
        let store = InMemoryEventStore::new();
        let stream = Uuid::new_v4();
        let first = noted(stream, 0);
        store.store(std::slice::from_ref(&first)).await.unwrap();

        // retrying the same batch must not duplicate the stream
        let err = store.store(std::slice::from_ref(&first)).await.unwrap_err();
        assert!(err.is_already_applied());

        // a mixed batch is rejected as a whole
        let fresh = noted(stream, 1);
        let err = store.store(&[fresh.clone(), first.clone()]).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEvent(id) if id == first.id));

        let stream_events = store.get_stream(stream, "Notebook").await.unwrap();
        assert_eq!(stream_events.len(), 1);
        assert!(matches!(store.get(fresh.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let store = InMemoryEventStore::new();
        let stream = Uuid::new_v4();
        store.store(&[noted(stream, 0), noted(stream, 1)]).await.unwrap();

        let err = store.store(&[noted(stream, 1)]).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 1, actual: 2, .. }));

        store.store(&[noted(stream, 2)]).await.unwrap();
        assert_eq!(store.get_stream(stream, "Notebook").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_order_preserved_under_concurrent_appends() {
        let store = Arc::new(InMemoryEventStore::new());
        let streams: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        let mut tasks = Vec::new();
        for &stream in &streams {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for version in 0..25 {
                    store.store(&[noted(stream, version)]).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for stream in streams {
            let versions: Vec<i64> = store
                .get_stream(stream, "Notebook")
                .await
                .unwrap()
                .iter()
                .map(|e| e.stream_version)
                .collect();
            assert_eq!(versions, (0..25).collect::<Vec<_>>());
        }
        assert_eq!(store.find_all().await.unwrap().len(), 200);
    }

    #[tokio::test]
    async fn test_stream_filtered_by_type() {
        let store = InMemoryEventStore::new();
        let stream = Uuid::new_v4();
        let mut other = noted(stream, 1);
        other.event_type = "test.Erased".into();
        store.store(&[noted(stream, 0), other, noted(stream, 2)]).await.unwrap();

        let noted_only = store
            .get_stream_events_by_type(stream, "Notebook", "test.Noted")
            .await
            .unwrap();
        assert_eq!(noted_only.iter().map(|e| e.stream_version).collect::<Vec<_>>(), vec![0, 2]);

        assert!(store.get_stream(Uuid::new_v4(), "Notebook").await.unwrap().is_empty());
    }
}
