// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// Backends are interchangeable behind `EventStore`:
// - memory:   map guarded by a reader/writer lock
// - postgres: append-only table ordered by a BIGSERIAL surrogate key
// - mongo:    document collection, bulk inserts chunked at 500, TTL index
//
// Every backend rejects a duplicate event id and a stale stream version.
//
// ============================================================================

pub mod memory;
pub mod mongo;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::event_sourcing::core::Event;

pub use memory::InMemoryEventStore;
pub use mongo::MongoEventStore;
pub use postgres::PostgresEventStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The id is already stored. Callers treat this as "already applied".
    #[error("event {0} already stored")]
    DuplicateEvent(Uuid),

    #[error("version conflict on {stream_name}/{stream_id}: expected {expected}, current is {actual}")]
    VersionConflict {
        stream_id: Uuid,
        stream_name: String,
        expected: i64,
        actual: i64,
    },

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// A duplicate id means the batch was applied before.
    pub fn is_already_applied(&self) -> bool {
        matches!(self, StoreError::DuplicateEvent(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch. Either all events of the batch become visible or,
    /// on a rejected batch, none do (memory/postgres; mongo per chunk).
    async fn store(&self, events: &[Event]) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Event, StoreError>;

    /// Every stored event in append order.
    async fn find_all(&self) -> Result<Vec<Event>, StoreError>;

    /// Events of one stream in append order. Empty when the stream is absent.
    async fn get_stream(&self, stream_id: Uuid, stream_name: &str) -> Result<Vec<Event>, StoreError>;

    async fn get_stream_events_by_type(
        &self,
        stream_id: Uuid,
        stream_name: &str,
        event_type: &str,
    ) -> Result<Vec<Event>, StoreError>;
}

/// First version each stream of a batch expects to find at the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub stream_id: Uuid,
    pub stream_name: String,
    pub expected_version: i64,
}

/// Checks a batch in isolation: ids are unique inside it and each stream's
/// versions are contiguous. Returns the expected head of every stream, in
/// first-seen order.
pub fn plan_append(events: &[Event]) -> Result<Vec<StreamAppend>, StoreError> {
    let mut seen_ids = HashSet::with_capacity(events.len());
    let mut plan: Vec<(StreamAppend, i64)> = Vec::new();

    for event in events {
        if !seen_ids.insert(event.id) {
            return Err(StoreError::DuplicateEvent(event.id));
        }

        let entry = plan
            .iter_mut()
            .find(|(s, _)| s.stream_id == event.stream_id && s.stream_name == event.stream_name);

        match entry {
            Some((append, next)) => {
                if event.stream_version != *next {
                    return Err(StoreError::VersionConflict {
                        stream_id: append.stream_id,
                        stream_name: append.stream_name.clone(),
                        expected: *next,
                        actual: event.stream_version,
                    });
                }
                *next += 1;
            }
            None => plan.push((
                StreamAppend {
                    stream_id: event.stream_id,
                    stream_name: event.stream_name.clone(),
                    expected_version: event.stream_version,
                },
                event.stream_version + 1,
            )),
        }
    }

    Ok(plan.into_iter().map(|(append, _)| append).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub(crate) struct Noted {
        pub text: String,
    }
    crate::named_event!(Noted => "test.Noted");

    pub(crate) fn noted(stream_id: Uuid, version: i64) -> Event {
        Event::new(stream_id, "Notebook", version, &Noted { text: format!("v{version}") }).unwrap()
    }

    #[test]
    fn test_plan_groups_streams() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let events = vec![noted(a, 2), noted(b, 0), noted(a, 3)];

        let plan = plan_append(&events).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].stream_id, a);
        assert_eq!(plan[0].expected_version, 2);
        assert_eq!(plan[1].expected_version, 0);
    }

    #[test]
    fn test_plan_rejects_gap() {
        let a = Uuid::new_v4();
        let err = plan_append(&[noted(a, 0), noted(a, 2)]).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn test_plan_rejects_repeated_id() {
        let a = Uuid::new_v4();
        let first = noted(a, 0);
        let mut second = noted(a, 1);
        second.id = first.id;

        let err = plan_append(&[first.clone(), second]).unwrap_err();
        assert!(err.is_already_applied());
    }
}
