use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::event::{Event, NamedEvent, RawEvent};

// ============================================================================
// Event Registry
// ============================================================================
//
// Maps an event type name to a decoder for its payload. Built explicitly at
// startup (each domain contributes its events) and passed to whoever needs
// to turn a stored/received Event back into a typed payload.
//
// ============================================================================

type Decoder =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn RawEvent>, serde_json::Error> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unregistered event type: {0}")]
    UnknownEventType(String),

    #[error("malformed payload for {event_type}: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Default)]
pub struct EventRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E` under its type name. Re-registering replaces the decoder.
    pub fn register<E: NamedEvent>(&mut self) -> &mut Self {
        let decoder: Decoder = Arc::new(|payload: &serde_json::Value| {
            let raw: E = serde_json::from_value(payload.clone())?;
            Ok(Box::new(raw) as Box<dyn RawEvent>)
        });
        if self.decoders.insert(E::EVENT_TYPE, decoder).is_some() {
            tracing::debug!(event_type = E::EVENT_TYPE, "Event decoder replaced");
        }
        self
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.decoders.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn decode(&self, event: &Event) -> Result<Box<dyn RawEvent>, RegistryError> {
        let decoder = self
            .decoders
            .get(event.event_type.as_str())
            .ok_or_else(|| RegistryError::UnknownEventType(event.event_type.clone()))?;

        decoder(&event.payload).map_err(|source| RegistryError::Malformed {
            event_type: event.event_type.clone(),
            source,
        })
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Opened {
        account: String,
    }
    crate::named_event!(Opened => "ledger.Opened");

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Closed {}
    crate::named_event!(Closed => "ledger.Closed");

    #[test]
    fn test_decode_registered_type() {
        let mut registry = EventRegistry::new();
        registry.register::<Opened>().register::<Closed>();

        let event = Event::new(Uuid::new_v4(), "Ledger", 0, &Opened { account: "a-1".into() }).unwrap();
        let raw = registry.decode(&event).unwrap();

        assert_eq!(raw.event_type(), "ledger.Opened");
        let opened = raw.as_any().downcast_ref::<Opened>().unwrap();
        assert_eq!(opened.account, "a-1");
        assert_eq!(registry.event_types(), vec!["ledger.Closed", "ledger.Opened"]);
    }

    #[test]
    fn test_unknown_type_is_typed_error() {
        let registry = EventRegistry::new();
        let event = Event::new(Uuid::new_v4(), "Ledger", 0, &Closed {}).unwrap();

        assert!(!registry.is_registered("ledger.Closed"));
        assert!(matches!(
            registry.decode(&event),
            Err(RegistryError::UnknownEventType(t)) if t == "ledger.Closed"
        ));
    }

    #[test]
    fn test_malformed_payload() {
        let mut registry = EventRegistry::new();
        registry.register::<Opened>();

        let mut event = Event::new(Uuid::new_v4(), "Ledger", 0, &Opened { account: "a".into() }).unwrap();
        event.payload = serde_json::json!({ "account": 42 });

        assert!(matches!(registry.decode(&event), Err(RegistryError::Malformed { .. })));
    }
}
