use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::context::{Context, Identity};

// ============================================================================
// Event - the persisted unit
// ============================================================================
//
// `(stream_id, stream_name, stream_version)` is unique per store and orders
// the events of one aggregate. `id` is never reused. Stored events are
// immutable: stores expose Store/Get/List, never Update/Delete.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub event_type: String,

    pub stream_id: Uuid,
    pub stream_name: String,
    pub stream_version: i64,

    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub payload: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

/// Who caused the event and from where.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

impl EventMetadata {
    /// Pulls identity and request facts from the call context.
    /// Returns `None` when the context carries neither.
    pub fn from_context(ctx: &Context) -> Option<Self> {
        let mut meta = EventMetadata {
            identity: ctx.identity().cloned(),
            ..Default::default()
        };
        if let Some(request) = ctx.metadata() {
            meta.ip_address = request.ip_address.clone();
            meta.user_agent = request.user_agent.clone();
            meta.referer = request.referer.clone();
        }

        if meta.is_empty() {
            None
        } else {
            Some(meta)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identity.is_none()
            && self.ip_address.is_none()
            && self.user_agent.is_none()
            && self.referer.is_none()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event {event_id} has type {found}, expected {expected}")]
    TypeMismatch {
        event_id: Uuid,
        expected: &'static str,
        found: String,
    },

    #[error("malformed payload for {event_type}: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Event {
    /// Wraps a raw event payload for the given stream position.
    pub fn new<E: NamedEvent>(
        stream_id: Uuid,
        stream_name: &str,
        stream_version: i64,
        raw: &E,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: E::EVENT_TYPE.to_string(),
            stream_id,
            stream_name: stream_name.to_string(),
            stream_version,
            occurred_at: Utc::now(),
            expires_at: None,
            payload: serde_json::to_value(raw)?,
            metadata: None,
        })
    }

    pub fn with_metadata(mut self, metadata: Option<EventMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_type<E: NamedEvent>(&self) -> bool {
        self.event_type == E::EVENT_TYPE
    }

    /// Decodes the payload into its concrete type.
    pub fn decode<E: NamedEvent>(&self) -> Result<E, DecodeError> {
        if !self.is_type::<E>() {
            return Err(DecodeError::TypeMismatch {
                event_id: self.id,
                expected: E::EVENT_TYPE,
                found: self.event_type.clone(),
            });
        }
        serde_json::from_value(self.payload.clone()).map_err(|source| DecodeError::Malformed {
            event_type: self.event_type.clone(),
            source,
        })
    }
}

// ============================================================================
// Raw Event - a payload that knows its own type name
// ============================================================================

/// Object-safe view of an event payload. The type name is the dispatch key
/// for the registry and for both buses.
pub trait RawEvent: fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// Statically named, serializable event payload.
pub trait NamedEvent: RawEvent + Serialize + DeserializeOwned + Clone {
    const EVENT_TYPE: &'static str;
}

/// Implements [`RawEvent`] and [`NamedEvent`] for a payload struct.
///
/// ```ignore
/// named_event!(WasCreated => "client.WasCreated");
/// ```
#[macro_export]
macro_rules! named_event {
    ($ty:ty => $name:expr) => {
        impl $crate::event_sourcing::RawEvent for $ty {
            fn event_type(&self) -> &'static str {
                $name
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        impl $crate::event_sourcing::NamedEvent for $ty {
            const EVENT_TYPE: &'static str = $name;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestMetadata;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Pinged {
        target: String,
    }
    crate::named_event!(Pinged => "test.Pinged");

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Ponged {}
    crate::named_event!(Ponged => "test.Ponged");

    #[test]
    fn test_event_wraps_payload() {
        let stream_id = Uuid::new_v4();
        let event = Event::new(stream_id, "Probe", 3, &Pinged { target: "db".into() }).unwrap();

        assert_eq!(event.event_type, "test.Pinged");
        assert_eq!(event.stream_id, stream_id);
        assert_eq!(event.stream_version, 3);
        assert!(event.metadata.is_none());
        assert_eq!(event.decode::<Pinged>().unwrap().target, "db");
    }

    #[test]
    fn test_decode_rejects_other_type() {
        let event = Event::new(Uuid::new_v4(), "Probe", 0, &Pinged { target: "x".into() }).unwrap();
        let err = event.decode::<Ponged>().unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { expected: "test.Ponged", .. }));
    }

    #[test]
    fn test_metadata_from_context() {
        assert!(EventMetadata::from_context(&Context::background()).is_none());

        let user_id = Uuid::new_v4();
        let ctx = Context::background()
            .with_identity(Identity::user(user_id))
            .with_metadata(RequestMetadata {
                ip_address: Some("127.0.0.1".into()),
                user_agent: Some("curl/8".into()),
                ..Default::default()
            });

        let meta = EventMetadata::from_context(&ctx).unwrap();
        assert_eq!(meta.identity.unwrap().user_id, user_id);
        assert_eq!(meta.ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8"));
        assert!(meta.referer.is_none());
    }

    #[test]
    fn test_json_shape_uses_type_key() {
        let event = Event::new(Uuid::new_v4(), "Probe", 0, &Ponged {}).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "test.Ponged");
        assert!(json.get("expires_at").is_none());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
