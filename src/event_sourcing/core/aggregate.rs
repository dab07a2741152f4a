use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use super::event::{Event, EventMetadata, NamedEvent};
use crate::context::Context;

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. State is derived from events (not stored directly)
// 2. Commands are validated before emitting events
// 3. State transitions are a pure `apply(state, event) -> state`
// 4. Each aggregate's events form a closed sum type, so a new variant is a
//    compile-time checked addition
//
// `AggregateRoot<A>` is the generic bookkeeping (id/version/pending changes)
// shared by every aggregate; `A` only supplies state and business rules.
//
// ============================================================================

/// Closed set of events belonging to one aggregate.
pub trait EventSet: Sized + Clone + fmt::Debug + Send + Sync {
    /// Decodes a stored event into the matching variant.
    fn decode(event: &Event) -> Result<Self, ReplayError>;

    /// Wraps the variant into a storable Event at the given stream position.
    fn encode(&self, stream_id: Uuid, stream_name: &str, version: i64) -> Result<Event, serde_json::Error>;

    fn event_type(&self) -> &'static str;
}

/// Implements [`EventSet`] for an enum whose variants each wrap one
/// [`NamedEvent`](super::event::NamedEvent) payload.
///
/// ```ignore
/// event_set!(ClientEvent {
///     WasCreated(WasCreated),
///     WasRemoved(WasRemoved),
/// });
/// ```
#[macro_export]
macro_rules! event_set {
    ($set:ident { $($variant:ident($ty:ty)),+ $(,)? }) => {
        impl $crate::event_sourcing::EventSet for $set {
            fn decode(
                event: &$crate::event_sourcing::Event,
            ) -> Result<Self, $crate::event_sourcing::ReplayError> {
                $(
                    if event.event_type == <$ty as $crate::event_sourcing::NamedEvent>::EVENT_TYPE {
                        return $crate::event_sourcing::decode_payload::<$ty>(event).map($set::$variant);
                    }
                )+
                Err($crate::event_sourcing::ReplayError::unknown(event))
            }

            fn encode(
                &self,
                stream_id: ::uuid::Uuid,
                stream_name: &str,
                version: i64,
            ) -> Result<$crate::event_sourcing::Event, ::serde_json::Error> {
                match self {
                    $($set::$variant(e) => $crate::event_sourcing::Event::new(stream_id, stream_name, version, e),)+
                }
            }

            fn event_type(&self) -> &'static str {
                match self {
                    $($set::$variant(_) => <$ty as $crate::event_sourcing::NamedEvent>::EVENT_TYPE,)+
                }
            }
        }
    };
}

/// Payload of `event` as `E`, with replay-flavoured errors.
pub fn decode_payload<E: NamedEvent>(event: &Event) -> Result<E, ReplayError> {
    serde_json::from_value(event.payload.clone()).map_err(|e| ReplayError::malformed(event, e))
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unknown event type {event_type} in stream {stream_name}")]
    UnknownEventType {
        event_type: String,
        stream_name: String,
    },

    #[error("malformed payload for {event_type}: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("event {event_id} at version {found} breaks stream order (expected {expected})")]
    OutOfOrder {
        event_id: Uuid,
        expected: i64,
        found: i64,
    },
}

impl ReplayError {
    pub fn unknown(event: &Event) -> Self {
        ReplayError::UnknownEventType {
            event_type: event.event_type.clone(),
            stream_name: event.stream_name.clone(),
        }
    }

    pub fn malformed(event: &Event, source: serde_json::Error) -> Self {
        ReplayError::Malformed {
            event_type: event.event_type.clone(),
            source,
        }
    }
}

/// Generic Aggregate trait - all event-sourced aggregates implement this
///
/// Type Parameters:
/// - `Event`: The sum type of this aggregate's events
/// - `Command`: The command type for this aggregate
/// - `Error`: The error type for business rule violations
pub trait Aggregate: Default + Clone + fmt::Debug + Send + Sync + 'static {
    type Event: EventSet;
    type Command;
    type Error: From<serde_json::Error>;

    /// Stream name shared by every instance of this aggregate.
    const STREAM_NAME: &'static str;

    fn id(&self) -> Uuid;

    /// Pure state transition.
    fn apply(self, event: &Self::Event) -> Self;

    /// Validates a command against current state and decides which events happen.
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    state: A,
    version: i64,
    changes: Vec<Event>,
}

impl<A: Aggregate> Default for AggregateRoot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Zero state, version 0, nothing pending.
    pub fn new() -> Self {
        Self {
            state: A::default(),
            version: 0,
            changes: Vec::new(),
        }
    }

    /// Replays history in stream order. Every event bumps the version once;
    /// the result has no pending changes.
    pub fn from_history(events: &[Event]) -> Result<Self, ReplayError> {
        let mut root = Self::new();

        for event in events {
            if event.stream_version != root.version {
                return Err(ReplayError::OutOfOrder {
                    event_id: event.id,
                    expected: root.version,
                    found: event.stream_version,
                });
            }
            let variant = A::Event::decode(event)?;
            root.state = root.state.apply(&variant);
            root.version += 1;
        }

        Ok(root)
    }

    /// Applies `event`, wraps it at the current version with identity and
    /// request metadata from `ctx`, and appends it to the pending changes.
    pub fn track_change(&mut self, ctx: &Context, event: A::Event) -> Result<&Event, serde_json::Error> {
        self.state = std::mem::take(&mut self.state).apply(&event);

        let stored = event
            .encode(self.state.id(), A::STREAM_NAME, self.version)?
            .with_metadata(EventMetadata::from_context(ctx));

        self.version += 1;
        self.changes.push(stored);
        Ok(&self.changes[self.changes.len() - 1])
    }

    /// Runs a command through the aggregate's business rules and tracks
    /// every resulting event. Returns how many events were produced.
    pub fn execute(&mut self, ctx: &Context, command: &A::Command) -> Result<usize, A::Error> {
        let events = self.state.handle_command(command)?;
        let count = events.len();
        for event in events {
            self.track_change(ctx, event)?;
        }
        Ok(count)
    }

    pub fn id(&self) -> Uuid {
        self.state.id()
    }

    /// Number of events applied so far, persisted or pending.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    pub fn changes(&self) -> &[Event] {
        &self.changes
    }

    pub fn take_changes(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Opened {
        id: Uuid,
    }
    crate::named_event!(Opened => "counter.Opened");

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Bumped {
        by: u32,
    }
    crate::named_event!(Bumped => "counter.Bumped");

    #[derive(Debug, Clone)]
    enum CounterEvent {
        Opened(Opened),
        Bumped(Bumped),
    }

    impl EventSet for CounterEvent {
        fn decode(event: &Event) -> Result<Self, ReplayError> {
            match event.event_type.as_str() {
                "counter.Opened" => serde_json::from_value(event.payload.clone())
                    .map(CounterEvent::Opened)
                    .map_err(|e| ReplayError::malformed(event, e)),
                "counter.Bumped" => serde_json::from_value(event.payload.clone())
                    .map(CounterEvent::Bumped)
                    .map_err(|e| ReplayError::malformed(event, e)),
                _ => Err(ReplayError::unknown(event)),
            }
        }

        fn encode(&self, stream_id: Uuid, stream_name: &str, version: i64) -> Result<Event, serde_json::Error> {
            match self {
                CounterEvent::Opened(e) => Event::new(stream_id, stream_name, version, e),
                CounterEvent::Bumped(e) => Event::new(stream_id, stream_name, version, e),
            }
        }

        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened(_) => "counter.Opened",
                CounterEvent::Bumped(_) => "counter.Bumped",
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        id: Uuid,
        total: u32,
    }

    #[derive(Debug, Error)]
    enum CounterError {
        #[error("zero bump")]
        ZeroBump,
        #[error(transparent)]
        Serialization(#[from] serde_json::Error),
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Command = u32;
        type Error = CounterError;
        const STREAM_NAME: &'static str = "Counter";

        fn id(&self) -> Uuid {
            self.id
        }

        fn apply(self, event: &CounterEvent) -> Self {
            match event {
                CounterEvent::Opened(e) => Counter { id: e.id, total: 0 },
                CounterEvent::Bumped(e) => Counter { total: self.total + e.by, ..self },
            }
        }

        fn handle_command(&self, by: &u32) -> Result<Vec<CounterEvent>, CounterError> {
            if *by == 0 {
                return Err(CounterError::ZeroBump);
            }
            Ok(vec![CounterEvent::Bumped(Bumped { by: *by })])
        }
    }

    fn opened_counter(ctx: &Context) -> AggregateRoot<Counter> {
        let mut root = AggregateRoot::<Counter>::new();
        root.track_change(ctx, CounterEvent::Opened(Opened { id: Uuid::new_v4() }))
            .unwrap();
        root
    }

    #[test]
    fn test_track_change_assigns_consecutive_versions() {
        let ctx = Context::background();
        let mut root = opened_counter(&ctx);
        root.execute(&ctx, &2).unwrap();
        root.execute(&ctx, &3).unwrap();

        let versions: Vec<i64> = root.changes().iter().map(|e| e.stream_version).collect();
        assert_eq!(versions, vec![0, 1, 2]);
        assert_eq!(root.version(), 3);
        assert_eq!(root.state().total, 5);
        assert!(root.changes().iter().all(|e| e.stream_id == root.id() && e.stream_name == "Counter"));
    }

    #[test]
    fn test_track_change_attaches_identity() {
        let user = Uuid::new_v4();
        let ctx = Context::background().with_identity(Identity::user(user));
        let root = opened_counter(&ctx);

        let meta = root.changes()[0].metadata.clone().unwrap();
        assert_eq!(meta.identity.unwrap().user_id, user);
    }

    #[test]
    fn test_rejected_command_tracks_nothing() {
        let ctx = Context::background();
        let mut root = opened_counter(&ctx);
        assert!(matches!(root.execute(&ctx, &0), Err(CounterError::ZeroBump)));
        assert_eq!(root.changes().len(), 1);
    }

    #[test]
    fn test_from_history_is_deterministic() {
        let ctx = Context::background();
        let mut root = opened_counter(&ctx);
        root.execute(&ctx, &4).unwrap();
        let history = root.take_changes();

        let first = AggregateRoot::<Counter>::from_history(&history).unwrap();
        let second = AggregateRoot::<Counter>::from_history(&history).unwrap();

        assert_eq!(first.state(), second.state());
        assert_eq!(first.version(), 2);
        assert_eq!(first.id(), second.id());
        assert!(first.changes().is_empty());
        assert_eq!(first.state().total, 4);
    }

    #[test]
    fn test_from_history_unknown_type_is_error() {
        let ctx = Context::background();
        let mut history = opened_counter(&ctx).take_changes();
        history[0].event_type = "counter.Exploded".into();

        let err = AggregateRoot::<Counter>::from_history(&history).unwrap_err();
        assert!(matches!(err, ReplayError::UnknownEventType { .. }));
    }

    #[test]
    fn test_from_history_rejects_gap() {
        let ctx = Context::background();
        let mut root = opened_counter(&ctx);
        root.execute(&ctx, &1).unwrap();
        let mut history = root.take_changes();
        history.remove(0);

        let err = AggregateRoot::<Counter>::from_history(&history).unwrap_err();
        assert!(matches!(err, ReplayError::OutOfOrder { expected: 0, found: 1, .. }));
    }
}
