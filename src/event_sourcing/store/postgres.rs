use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgExecutor, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{plan_append, EventStore, StoreError};
use crate::event_sourcing::core::{Event, EventMetadata};

// ============================================================================
// PostgreSQL Event Store
// ============================================================================
//
// Append-only `events` table. `distinct_id` (BIGSERIAL) is the true sort
// key; `occurred_at` is informational. A batch is written as one multi-row
// INSERT inside a transaction that first checks the head of every stream.
//
// Unique constraints back the checks when two writers race:
// - events_event_id_key             -> DuplicateEvent
// - events_stream_version_key       -> VersionConflict
//
// ============================================================================

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS events (
    distinct_id    BIGSERIAL PRIMARY KEY,
    event_id       UUID NOT NULL,
    event_type     TEXT NOT NULL,
    stream_id      UUID NOT NULL,
    stream_name    TEXT NOT NULL,
    stream_version BIGINT NOT NULL,
    occurred_at    TIMESTAMPTZ NOT NULL,
    expires_at     TIMESTAMPTZ NULL,
    payload        JSONB NOT NULL,
    metadata       JSONB NULL,
    CONSTRAINT events_event_id_key UNIQUE (event_id),
    CONSTRAINT events_stream_version_key UNIQUE (stream_id, stream_name, stream_version)
)";

const CREATE_STREAM_INDEX: &str = "CREATE INDEX IF NOT EXISTS events_stream_type_idx
    ON events (stream_id, stream_name, event_type, occurred_at)";

const SELECT_COLUMNS: &str = "SELECT event_id, event_type, stream_id, stream_name, stream_version,
        occurred_at, expires_at, payload, metadata
 FROM events";

const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(backend)?;

        tracing::info!(max_connections, "✅ Connected to PostgreSQL event store");
        Ok(Self::new(pool))
    }

    /// Creates the table and indexes when missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in [CREATE_TABLE, CREATE_STREAM_INDEX] {
            sqlx::query(statement).execute(&self.pool).await.map_err(backend)?;
        }
        tracing::info!("✅ Event store schema ready");
        Ok(())
    }

    async fn stream_head<'e, E: PgExecutor<'e>>(
        executor: E,
        stream_id: Uuid,
        stream_name: &str,
    ) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(stream_version) + 1, 0) FROM events
             WHERE stream_id = $1 AND stream_name = $2",
        )
        .bind(stream_id)
        .bind(stream_name)
        .fetch_one(executor)
        .await
        .map_err(backend)
    }

    async fn fetch(&self, query: QueryBuilder<'_, Postgres>) -> Result<Vec<Event>, StoreError> {
        let mut query = query;
        let rows = query.build().fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(event_from_row).collect()
    }

    /// Translates a constraint violation raised by a concurrent writer.
    async fn classify_violation(&self, events: &[Event], err: sqlx::Error) -> StoreError {
        let constraint = match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                db.constraint().map(str::to_string)
            }
            _ => None,
        };

        match constraint.as_deref() {
            Some("events_event_id_key") => match events.first() {
                Some(first) => StoreError::DuplicateEvent(first.id),
                None => backend(err),
            },
            Some("events_stream_version_key") => match events.first() {
                Some(first) => {
                    let actual = Self::stream_head(&self.pool, first.stream_id, &first.stream_name)
                        .await
                        .unwrap_or(-1);
                    StoreError::VersionConflict {
                        stream_id: first.stream_id,
                        stream_name: first.stream_name.clone(),
                        expected: first.stream_version,
                        actual,
                    }
                }
                None => backend(err),
            },
            _ => backend(err),
        }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn store(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let plan = plan_append(events)?;

        let mut tx = self.pool.begin().await.map_err(backend)?;

        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT event_id FROM events WHERE event_id = ANY($1) LIMIT 1",
        )
        .bind(&ids)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if let Some(id) = existing {
            return Err(StoreError::DuplicateEvent(id));
        }

        for append in &plan {
            let head = Self::stream_head(&mut *tx, append.stream_id, &append.stream_name).await?;
            if head != append.expected_version {
                return Err(StoreError::VersionConflict {
                    stream_id: append.stream_id,
                    stream_name: append.stream_name.clone(),
                    expected: append.expected_version,
                    actual: head,
                });
            }
        }

        let mut insert = insert_query(events)?;
        if let Err(err) = insert.build().execute(&mut *tx).await {
            return Err(self.classify_violation(events, err).await);
        }
        if let Err(err) = tx.commit().await {
            return Err(self.classify_violation(events, err).await);
        }

        tracing::info!(event_count = events.len(), streams = plan.len(), "✅ Appended events to event store");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Event, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE event_id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => event_from_row(&row),
            None => Err(StoreError::NotFound(format!("event {id}"))),
        }
    }

    async fn find_all(&self) -> Result<Vec<Event>, StoreError> {
        Err(StoreError::Unsupported(
            "find_all would scan the whole events table; read streams instead",
        ))
    }

    async fn get_stream(&self, stream_id: Uuid, stream_name: &str) -> Result<Vec<Event>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        query
            .push(" WHERE stream_id = ")
            .push_bind(stream_id)
            .push(" AND stream_name = ")
            .push_bind(stream_name.to_string())
            .push(" ORDER BY distinct_id ASC");

        let events = self.fetch(query).await?;
        tracing::debug!(stream_id = %stream_id, stream_name, count = events.len(), "Loaded stream");
        Ok(events)
    }

    async fn get_stream_events_by_type(
        &self,
        stream_id: Uuid,
        stream_name: &str,
        event_type: &str,
    ) -> Result<Vec<Event>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        query
            .push(" WHERE stream_id = ")
            .push_bind(stream_id)
            .push(" AND stream_name = ")
            .push_bind(stream_name.to_string())
            .push(" AND event_type = ")
            .push_bind(event_type.to_string())
            .push(" ORDER BY distinct_id ASC");

        self.fetch(query).await
    }
}

/// One multi-row INSERT for the whole batch, in batch order.
fn insert_query(events: &[Event]) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let mut rows = Vec::with_capacity(events.len());
    for event in events {
        let metadata = event.metadata.as_ref().map(serde_json::to_value).transpose()?;
        rows.push((event.clone(), metadata));
    }

    let mut query = QueryBuilder::<Postgres>::new(
        "INSERT INTO events (event_id, event_type, stream_id, stream_name, stream_version, \
         occurred_at, expires_at, payload, metadata) ",
    );
    query.push_values(rows, |mut row, (event, metadata)| {
        row.push_bind(event.id)
            .push_bind(event.event_type)
            .push_bind(event.stream_id)
            .push_bind(event.stream_name)
            .push_bind(event.stream_version)
            .push_bind(event.occurred_at)
            .push_bind(event.expires_at)
            .push_bind(event.payload)
            .push_bind(metadata);
    });
    Ok(query)
}

fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    let metadata: Option<serde_json::Value> = row.try_get("metadata").map_err(backend)?;
    let metadata = metadata
        .map(serde_json::from_value::<EventMetadata>)
        .transpose()?;

    Ok(Event {
        id: row.try_get("event_id").map_err(backend)?,
        event_type: row.try_get("event_type").map_err(backend)?,
        stream_id: row.try_get("stream_id").map_err(backend)?,
        stream_name: row.try_get("stream_name").map_err(backend)?,
        stream_version: row.try_get("stream_version").map_err(backend)?,
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at").map_err(backend)?,
        expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at").map_err(backend)?,
        payload: row.try_get("payload").map_err(backend)?,
        metadata,
    })
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
