// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Events (one sum type per aggregate)
// - Commands
// - Errors
// - Aggregate implementation
// - Command handlers
// - Projection (read-model repository + event handlers)
//
// This module also wires the domain into the runtime: event registration,
// command handler subscription and the event-type -> handler map.
//
// ============================================================================

pub mod client;
pub mod token;
pub mod user;

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{Context, Identity};
use crate::error::AppError;
use crate::event_sourcing::{EventRegistry, EventStore, NamedEvent, Repository};
use crate::messaging::{CommandBus, EventBus, EventHandler};
use crate::metrics::Metrics;

use client::{ClientRepository, InMemoryClientRepository};
use token::{InMemoryTokenRepository, TokenRepository};
use user::{InMemoryUserRepository, Mailer, UserRepository};

/// Registers the events of every aggregate.
pub fn register_events(registry: &mut EventRegistry) {
    client::register_events(registry);
    token::register_events(registry);
    user::register_events(registry);
}

pub fn event_registry() -> EventRegistry {
    let mut registry = EventRegistry::new();
    register_events(&mut registry);
    registry
}

pub(crate) fn require_identity(ctx: &Context) -> Result<Identity, AppError> {
    ctx.identity()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("no identity on the request".into()))
}

/// Read-side repositories shared by projections and command handlers.
#[derive(Clone)]
pub struct ReadModels {
    pub clients: Arc<dyn ClientRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl ReadModels {
    pub fn in_memory() -> Self {
        Self {
            clients: Arc::new(InMemoryClientRepository::new()),
            tokens: Arc::new(InMemoryTokenRepository::new()),
            users: Arc::new(InMemoryUserRepository::new()),
        }
    }
}

/// Everything the write side needs to build aggregate repositories.
#[derive(Clone)]
pub struct WriteSide {
    pub store: Arc<dyn EventStore>,
    pub events: Arc<dyn EventBus>,
    pub metrics: Option<Arc<Metrics>>,
}

impl WriteSide {
    fn repository<A: crate::event_sourcing::Aggregate>(&self) -> Repository<A> {
        let repository = Repository::new(self.store.clone(), self.events.clone());
        match &self.metrics {
            Some(metrics) => repository.with_metrics(metrics.clone()),
            None => repository,
        }
    }
}

/// Subscribes every domain command handler on `bus`.
pub async fn register_command_handlers(bus: &CommandBus, write: &WriteSide, read_models: &ReadModels) {
    bus.subscribe(client::CreateClient::NAME, client::OnCreateClient::new(write.repository()))
        .await;
    bus.subscribe(client::RemoveClient::NAME, client::OnRemoveClient::new(write.repository()))
        .await;

    bus.subscribe(token::CreateToken::NAME, token::OnCreateToken::new(write.repository()))
        .await;
    bus.subscribe(token::RemoveToken::NAME, token::OnRemoveToken::new(write.repository()))
        .await;

    bus.subscribe(
        user::RegisterWithEmail::NAME,
        user::OnRegisterWithEmail::new(write.repository(), read_models.users.clone()),
    )
    .await;
    bus.subscribe(
        user::ChangeEmailAddress::NAME,
        user::OnChangeEmailAddress::new(write.repository(), read_models.users.clone()),
    )
    .await;
    bus.subscribe(user::RequestAccessToken::NAME, user::OnRequestAccessToken::new(write.repository()))
        .await;
}

/// Event type -> handler, one entry per event the read side reacts to.
pub fn event_handlers(
    read_models: &ReadModels,
    mailer: Arc<dyn Mailer>,
    magic_link_base_url: &str,
) -> HashMap<String, Arc<dyn EventHandler>> {
    fn entry<E: NamedEvent>(handler: impl EventHandler) -> (String, Arc<dyn EventHandler>) {
        (E::EVENT_TYPE.to_string(), Arc::new(handler))
    }

    HashMap::from([
        entry::<client::WasCreated>(client::WhenClientWasCreated::new(read_models.clients.clone())),
        entry::<client::WasRemoved>(client::WhenClientWasRemoved::new(read_models.clients.clone())),
        entry::<token::WasCreated>(token::WhenTokenWasCreated::new(read_models.tokens.clone())),
        entry::<token::WasRemoved>(token::WhenTokenWasRemoved::new(read_models.tokens.clone())),
        entry::<user::WasRegisteredWithEmail>(user::WhenUserWasRegisteredWithEmail::new(read_models.users.clone())),
        entry::<user::EmailAddressWasChanged>(user::WhenUserEmailAddressWasChanged::new(read_models.users.clone())),
        entry::<user::AccessTokenWasRequested>(user::WhenUserAccessTokenWasRequested::new(
            mailer,
            magic_link_base_url,
        )),
    ])
}
