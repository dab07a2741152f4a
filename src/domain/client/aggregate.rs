use uuid::Uuid;

use super::commands::ClientCommand;
use super::errors::ClientError;
use super::events::*;
use crate::event_sourcing::Aggregate;

// ============================================================================
// Client Aggregate - Business Logic
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub secret: String,
    pub domain: String,
    pub removed: bool,
}

impl Client {
    fn is_created(&self) -> bool {
        !self.id.is_nil()
    }
}

impl Aggregate for Client {
    type Event = ClientEvent;
    type Command = ClientCommand;
    type Error = ClientError;
    const STREAM_NAME: &'static str = "Client";

    fn id(&self) -> Uuid {
        self.id
    }

    fn apply(self, event: &ClientEvent) -> Self {
        match event {
            ClientEvent::WasCreated(e) => Client {
                id: e.id,
                user_id: e.user_id,
                secret: e.secret.clone(),
                domain: e.domain.clone(),
                removed: false,
            },
            ClientEvent::WasRemoved(_) => Client { removed: true, ..self },
        }
    }

    fn handle_command(&self, command: &ClientCommand) -> Result<Vec<ClientEvent>, ClientError> {
        match command {
            ClientCommand::Create {
                id,
                user_id,
                secret,
                domain,
                data,
            } => {
                if self.is_created() {
                    return Err(ClientError::AlreadyCreated);
                }
                if secret.trim().is_empty() {
                    return Err(ClientError::EmptySecret);
                }
                if domain.trim().is_empty() {
                    return Err(ClientError::EmptyDomain);
                }
                Ok(vec![ClientEvent::WasCreated(WasCreated {
                    id: *id,
                    user_id: *user_id,
                    secret: secret.clone(),
                    domain: domain.clone(),
                    data: data.clone(),
                })])
            }
            ClientCommand::Remove => {
                if !self.is_created() {
                    return Err(ClientError::NotCreated);
                }
                if self.removed {
                    return Err(ClientError::AlreadyRemoved);
                }
                Ok(vec![ClientEvent::WasRemoved(WasRemoved { id: self.id })])
            }
        }
    }
}
