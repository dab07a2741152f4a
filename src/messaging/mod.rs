// ============================================================================
// Messaging - Command Bus, Event Buses, Subscription Registrar
// ============================================================================
//
// - command_bus: one handler per command name, result over a oneshot
// - event_bus:   fan-out of published events (local or broker-backed)
// - envelope:    wire format of events travelling through the broker
// - registrar:   keeps remote subscriptions alive for the process lifetime
//
// ============================================================================

pub mod command_bus;
pub mod envelope;
pub mod event_bus;
pub mod registrar;

use std::fmt;

use uuid::Uuid;

pub use command_bus::{Command, CommandBus, CommandBusError, CommandHandler};
pub use envelope::Envelope;
pub use event_bus::{
    handler_fn, EventBus, EventBusError, EventHandler, LocalEventBus, RemoteEventBus, Subscription,
};
pub use registrar::{Registrar, RegistrarConfig, RegistrarError};

/// Opaque handle identifying one subscription. Required to unsubscribe.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
