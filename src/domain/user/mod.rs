// ============================================================================
// User Domain - passwordless (magic link) users
// ============================================================================
//
// - Value objects (EmailAddress)
// - Events (WasRegisteredWithEmail, EmailAddressWasChanged, AccessTokenWasRequested)
// - Commands (RegisterWithEmail, ChangeEmailAddress, RequestAccessToken)
// - Errors (UserError enum)
// - Aggregate (User)
// - Command handlers
// - Projection (UserRepository) and the magic-link mailer handler
//
// ============================================================================

pub mod aggregate;
pub mod command_handler;
pub mod commands;
pub mod errors;
pub mod events;
pub mod mailer;
pub mod projection;
pub mod value_objects;

pub use aggregate::*;
pub use command_handler::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use mailer::*;
pub use projection::*;
pub use value_objects::*;

use crate::event_sourcing::EventRegistry;

pub fn register_events(registry: &mut EventRegistry) {
    registry
        .register::<WasRegisteredWithEmail>()
        .register::<EmailAddressWasChanged>()
        .register::<AccessTokenWasRequested>();
}
