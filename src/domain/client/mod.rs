// ============================================================================
// Client Domain - OAuth2 clients owned by a user
// ============================================================================
//
// - Events (WasCreated, WasRemoved)
// - Commands (CreateClient, RemoveClient)
// - Errors (ClientError enum)
// - Aggregate (Client)
// - Command handlers (OnCreateClient, OnRemoveClient)
// - Projection (ClientRepository + event handlers keeping it current)
//
// ============================================================================

pub mod aggregate;
pub mod command_handler;
pub mod commands;
pub mod errors;
pub mod events;
pub mod projection;

pub use aggregate::*;
pub use command_handler::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use projection::*;

use crate::event_sourcing::EventRegistry;

pub fn register_events(registry: &mut EventRegistry) {
    registry.register::<WasCreated>().register::<WasRemoved>();
}
