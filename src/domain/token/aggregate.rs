use uuid::Uuid;

use super::commands::TokenCommand;
use super::errors::TokenError;
use super::events::*;
use crate::event_sourcing::Aggregate;

// ============================================================================
// Token Aggregate
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Token {
    pub id: Uuid,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub access: String,
    pub refresh: String,
    pub scope: String,
    pub removed: bool,
}

impl Aggregate for Token {
    type Event = TokenEvent;
    type Command = TokenCommand;
    type Error = TokenError;
    const STREAM_NAME: &'static str = "Token";

    fn id(&self) -> Uuid {
        self.id
    }

    fn apply(self, event: &TokenEvent) -> Self {
        match event {
            TokenEvent::WasCreated(e) => Token {
                id: e.id,
                client_id: e.client_id,
                user_id: e.user_id,
                access: e.access.clone(),
                refresh: e.refresh.clone(),
                scope: e.scope.clone(),
                removed: false,
            },
            TokenEvent::WasRemoved(_) => Token { removed: true, ..self },
        }
    }

    fn handle_command(&self, command: &TokenCommand) -> Result<Vec<TokenEvent>, TokenError> {
        match command {
            TokenCommand::Create {
                id,
                client_id,
                user_id,
                access,
                refresh,
                scope,
                expires_in,
                user_agent,
            } => {
                if !self.id.is_nil() {
                    return Err(TokenError::AlreadyCreated);
                }
                if access.is_empty() {
                    return Err(TokenError::EmptyAccess);
                }
                Ok(vec![TokenEvent::WasCreated(WasCreated {
                    id: *id,
                    client_id: *client_id,
                    user_id: *user_id,
                    access: access.clone(),
                    refresh: refresh.clone(),
                    scope: scope.clone(),
                    expires_in_secs: expires_in.as_secs(),
                    user_agent: user_agent.clone(),
                })])
            }
            TokenCommand::Remove => {
                if self.id.is_nil() {
                    return Err(TokenError::NotCreated);
                }
                if self.removed {
                    return Err(TokenError::AlreadyRemoved);
                }
                Ok(vec![TokenEvent::WasRemoved(WasRemoved { id: self.id })])
            }
        }
    }
}
