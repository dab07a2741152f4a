use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, Bson};
use mongodb::error::{ErrorKind, IndexedWriteError};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{plan_append, EventStore, StoreError};
use crate::event_sourcing::core::{Event, EventMetadata};

// ============================================================================
// MongoDB Event Store
// ============================================================================
//
// One document per event in the `events` collection. Batches are inserted
// as ordered bulk writes of at most BATCH_SIZE documents; a rejected chunk
// stops the remaining ones. Streams are read back sorted by version.
//
// Indexes (see `ensure_indexes`):
// - event_id_unique        unique event id
// - stream_version_unique  unique (stream_id, stream_name, stream_version)
// - stream_type            (stream_id, stream_name, type, occurred_at)
// - expires_at_ttl         TTL on expires_at
//
// ============================================================================

pub const BATCH_SIZE: usize = 500;

const COLLECTION: &str = "events";
const DUPLICATE_KEY: i32 = 11000;
const EVENT_ID_INDEX: &str = "event_id_unique";
const STREAM_VERSION_INDEX: &str = "stream_version_unique";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct EventDocument {
    event_id: String,
    #[serde(rename = "type")]
    event_type: String,
    stream_id: String,
    stream_name: String,
    stream_version: i64,
    occurred_at: bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<bson::DateTime>,
    payload: Bson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Bson>,
}

impl EventDocument {
    fn from_event(event: &Event) -> Result<Self, StoreError> {
        let metadata = match &event.metadata {
            Some(meta) => Some(json_to_bson(&serde_json::to_value(meta)?)?),
            None => None,
        };

        Ok(Self {
            event_id: event.id.to_string(),
            event_type: event.event_type.clone(),
            stream_id: event.stream_id.to_string(),
            stream_name: event.stream_name.clone(),
            stream_version: event.stream_version,
            occurred_at: bson::DateTime::from_millis(event.occurred_at.timestamp_millis()),
            expires_at: event
                .expires_at
                .map(|at| bson::DateTime::from_millis(at.timestamp_millis())),
            payload: json_to_bson(&event.payload)?,
            metadata,
        })
    }

    fn into_event(self) -> Result<Event, StoreError> {
        let metadata = self
            .metadata
            .map(|meta| serde_json::from_value::<EventMetadata>(meta.into_relaxed_extjson()))
            .transpose()?;

        Ok(Event {
            id: parse_uuid(&self.event_id)?,
            event_type: self.event_type,
            stream_id: parse_uuid(&self.stream_id)?,
            stream_name: self.stream_name,
            stream_version: self.stream_version,
            occurred_at: to_chrono(self.occurred_at)?,
            expires_at: self.expires_at.map(to_chrono).transpose()?,
            payload: self.payload.into_relaxed_extjson(),
            metadata,
        })
    }
}

pub struct MongoEventStore {
    events: Collection<EventDocument>,
}

impl MongoEventStore {
    pub fn new(database: &Database) -> Self {
        Self {
            events: database.collection(COLLECTION),
        }
    }

    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await.map_err(backend)?;
        tracing::info!(database, "✅ Connected to MongoDB event store");
        Ok(Self::new(&client.database(database)))
    }

    /// Creates the uniqueness, lookup and TTL indexes.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let indexes = [
            IndexModel::builder()
                .keys(doc! { "event_id": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(EVENT_ID_INDEX.to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "stream_id": 1, "stream_name": 1, "stream_version": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(STREAM_VERSION_INDEX.to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "stream_id": 1, "stream_name": 1, "type": 1, "occurred_at": 1 })
                .options(IndexOptions::builder().name("stream_type".to_string()).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(
                    IndexOptions::builder()
                        .name("expires_at_ttl".to_string())
                        .expire_after(Duration::from_secs(0))
                        .build(),
                )
                .build(),
        ];

        for index in indexes {
            self.events.create_index(index).await.map_err(backend)?;
        }
        tracing::info!("✅ Event store indexes ready");
        Ok(())
    }

    async fn stream_head(&self, stream_id: Uuid, stream_name: &str) -> Result<i64, StoreError> {
        let last = self
            .events
            .find_one(doc! { "stream_id": stream_id.to_string(), "stream_name": stream_name })
            .sort(doc! { "stream_version": -1 })
            .await
            .map_err(backend)?;
        Ok(last.map(|d| d.stream_version + 1).unwrap_or(0))
    }

    async fn find(&self, filter: bson::Document, sort: bson::Document) -> Result<Vec<Event>, StoreError> {
        let cursor = self.events.find(filter).sort(sort).await.map_err(backend)?;
        let documents: Vec<EventDocument> = cursor.try_collect().await.map_err(backend)?;
        documents.into_iter().map(EventDocument::into_event).collect()
    }

    async fn insert_chunk(&self, chunk: &[Event]) -> Result<(), StoreError> {
        let documents = chunk
            .iter()
            .map(EventDocument::from_event)
            .collect::<Result<Vec<_>, _>>()?;

        match self.events.insert_many(documents).ordered(true).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.classify_write_error(chunk, err).await),
        }
    }

    async fn classify_write_error(&self, chunk: &[Event], err: mongodb::error::Error) -> StoreError {
        let failed: Option<&IndexedWriteError> = match err.kind.as_ref() {
            ErrorKind::InsertMany(insert) => insert
                .write_errors
                .as_ref()
                .and_then(|errors| errors.iter().find(|e| e.code == DUPLICATE_KEY)),
            _ => None,
        };

        let Some(failed) = failed else {
            return backend(err);
        };
        let Some(event) = chunk.get(failed.index) else {
            return backend(err);
        };

        match duplicate_key_index(&failed.message) {
            Some(EVENT_ID_INDEX) => StoreError::DuplicateEvent(event.id),
            Some(STREAM_VERSION_INDEX) => {
                let actual = self
                    .stream_head(event.stream_id, &event.stream_name)
                    .await
                    .unwrap_or(-1);
                StoreError::VersionConflict {
                    stream_id: event.stream_id,
                    stream_name: event.stream_name.clone(),
                    expected: event.stream_version,
                    actual,
                }
            }
            _ => backend(err),
        }
    }
}

#[async_trait]
impl EventStore for MongoEventStore {
    async fn store(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let plan = plan_append(events)?;

        let ids: Vec<String> = events.iter().map(|e| e.id.to_string()).collect();
        if let Some(existing) = self
            .events
            .find_one(doc! { "event_id": { "$in": ids } })
            .await
            .map_err(backend)?
        {
            return Err(StoreError::DuplicateEvent(parse_uuid(&existing.event_id)?));
        }

        for append in &plan {
            let head = self.stream_head(append.stream_id, &append.stream_name).await?;
            if head != append.expected_version {
                return Err(StoreError::VersionConflict {
                    stream_id: append.stream_id,
                    stream_name: append.stream_name.clone(),
                    expected: append.expected_version,
                    actual: head,
                });
            }
        }

        for chunk in events.chunks(BATCH_SIZE) {
            self.insert_chunk(chunk).await?;
        }

        tracing::info!(
            event_count = events.len(),
            chunks = events.len().div_ceil(BATCH_SIZE),
            "✅ Appended events to event store"
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Event, StoreError> {
        self.events
            .find_one(doc! { "event_id": id.to_string() })
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")))?
            .into_event()
    }

    async fn find_all(&self) -> Result<Vec<Event>, StoreError> {
        self.find(doc! {}, doc! { "_id": 1 }).await
    }

    async fn get_stream(&self, stream_id: Uuid, stream_name: &str) -> Result<Vec<Event>, StoreError> {
        self.find(
            doc! { "stream_id": stream_id.to_string(), "stream_name": stream_name },
            doc! { "stream_version": 1 },
        )
        .await
    }

    async fn get_stream_events_by_type(
        &self,
        stream_id: Uuid,
        stream_name: &str,
        event_type: &str,
    ) -> Result<Vec<Event>, StoreError> {
        self.find(
            doc! { "stream_id": stream_id.to_string(), "stream_name": stream_name, "type": event_type },
            doc! { "stream_version": 1 },
        )
        .await
    }
}

/// Name of the unique index a duplicate-key message refers to.
fn duplicate_key_index(message: &str) -> Option<&'static str> {
    [EVENT_ID_INDEX, STREAM_VERSION_INDEX]
        .into_iter()
        .find(|index| message.contains(index))
}

fn json_to_bson(value: &serde_json::Value) -> Result<Bson, StoreError> {
    bson::to_bson(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn to_chrono(at: bson::DateTime) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis())
        .ok_or_else(|| StoreError::Serialization(format!("timestamp out of range: {at}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Serialization(format!("invalid uuid {raw}: {e}")))
}

fn backend(err: mongodb::error::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;
    use crate::event_sourcing::store::tests::noted;

    #[test]
    fn test_document_mapping_keeps_event_intact() {
        let user = Uuid::new_v4();
        let mut event = noted(Uuid::new_v4(), 4)
            .with_metadata(Some(EventMetadata {
                identity: Some(Identity::user(user)),
                ip_address: Some("10.1.2.3".into()),
                ..Default::default()
            }))
            .with_expiry(Utc::now() + chrono::Duration::hours(1));
        // bson keeps millisecond precision
        event.occurred_at = DateTime::<Utc>::from_timestamp_millis(event.occurred_at.timestamp_millis()).unwrap();
        event.expires_at = event
            .expires_at
            .and_then(|at| DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis()));

        let document = EventDocument::from_event(&event).unwrap();
        assert_eq!(document.event_type, "test.Noted");
        assert_eq!(document.stream_version, 4);

        let back = document.into_event().unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_duplicate_key_message_names_index() {
        let msg = "E11000 duplicate key error collection: auth.events index: stream_version_unique dup key";
        assert_eq!(duplicate_key_index(msg), Some(STREAM_VERSION_INDEX));
        assert_eq!(
            duplicate_key_index("E11000 duplicate key error index: event_id_unique"),
            Some(EVENT_ID_INDEX)
        );
        assert_eq!(duplicate_key_index("E11000 index: _id_"), None);
    }

    #[test]
    fn test_batches_are_chunked() {
        let stream = Uuid::new_v4();
        let events: Vec<Event> = (0..1201).map(|v| noted(stream, v)).collect();
        let sizes: Vec<usize> = events.chunks(BATCH_SIZE).map(<[Event]>::len).collect();
        assert_eq!(sizes, vec![500, 500, 201]);
    }
}
