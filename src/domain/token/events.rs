use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Token Domain Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasCreated {
    pub id: Uuid,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub access: String,
    #[serde(default)]
    pub refresh: String,
    #[serde(default)]
    pub scope: String,
    pub expires_in_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}
crate::named_event!(WasCreated => "token.WasCreated");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasRemoved {
    pub id: Uuid,
}
crate::named_event!(WasRemoved => "token.WasRemoved");

#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    WasCreated(WasCreated),
    WasRemoved(WasRemoved),
}

crate::event_set!(TokenEvent {
    WasCreated(WasCreated),
    WasRemoved(WasRemoved),
});
