// ============================================================================
// Token Domain - OAuth2 access/refresh token pairs
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
