use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::EmailAddress;

// ============================================================================
// User Domain Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasRegisteredWithEmail {
    pub id: Uuid,
    pub email: EmailAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_path: Option<String>,
}
crate::named_event!(WasRegisteredWithEmail => "user.WasRegisteredWithEmail");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddressWasChanged {
    pub id: Uuid,
    pub email: EmailAddress,
}
crate::named_event!(EmailAddressWasChanged => "user.EmailAddressWasChanged");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenWasRequested {
    pub id: Uuid,
    pub email: EmailAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_path: Option<String>,
}
crate::named_event!(AccessTokenWasRequested => "user.AccessTokenWasRequested");

#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    WasRegisteredWithEmail(WasRegisteredWithEmail),
    EmailAddressWasChanged(EmailAddressWasChanged),
    AccessTokenWasRequested(AccessTokenWasRequested),
}

crate::event_set!(UserEvent {
    WasRegisteredWithEmail(WasRegisteredWithEmail),
    EmailAddressWasChanged(EmailAddressWasChanged),
    AccessTokenWasRequested(AccessTokenWasRequested),
});
