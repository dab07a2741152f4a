// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable event sourcing infrastructure.
// Domain-specific code is in src/domain/
//
// ============================================================================

mod core;
mod replay;
mod repository;
mod store;

pub use self::core::*;
pub use replay::{ReplayReport, Replayer};
pub use repository::{Repository, RepositoryError};
pub use self::store::*;
