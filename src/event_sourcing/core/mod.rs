// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// Key Principles:
// - No domain-specific code (no Client, Token, User, etc.)
// - Generic over aggregate types
// - Reusable across all aggregates
//
// ============================================================================

pub mod aggregate;
pub mod event;
pub mod execution;
pub mod registry;

pub use aggregate::{decode_payload, Aggregate, AggregateRoot, EventSet, ReplayError};
pub use event::{DecodeError, Event, EventMetadata, NamedEvent, RawEvent};
pub use execution::ExecutionMode;
pub use registry::{EventRegistry, RegistryError};
