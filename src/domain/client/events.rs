use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Client Domain Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasCreated {
    pub id: Uuid,
    pub user_id: Uuid,
    pub secret: String,
    pub domain: String,
    /// Opaque client info as supplied by the OAuth2 layer
    #[serde(default)]
    pub data: serde_json::Value,
}
crate::named_event!(WasCreated => "client.WasCreated");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasRemoved {
    pub id: Uuid,
}
crate::named_event!(WasRemoved => "client.WasRemoved");

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    WasCreated(WasCreated),
    WasRemoved(WasRemoved),
}

crate::event_set!(ClientEvent {
    WasCreated(WasCreated),
    WasRemoved(WasRemoved),
});
