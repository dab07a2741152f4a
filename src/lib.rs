// ============================================================================
// cqrs_runtime - Event-Sourced CQRS Runtime
// ============================================================================
//
// Write side:  Command Bus -> Aggregate -> Event Store -> Event Bus
// Read side:   Event Bus -> projection handlers -> read-model repositories
//
// The event bus comes in two flavours: in-process fan-out and a remote
// variant that talks to the standalone `pubsub` broker over gRPC.
//
// ============================================================================

pub mod broker;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod event_sourcing;
pub mod health;
pub mod messaging;
pub mod metrics;
pub mod telemetry;
pub mod utils;

pub use context::{CancelHandle, Context, ContextError, Identity, RequestMetadata};
pub use error::AppError;
