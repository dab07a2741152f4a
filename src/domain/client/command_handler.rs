use async_trait::async_trait;

use super::aggregate::Client;
use super::commands::{ClientCommand, CreateClient, RemoveClient};
use crate::context::Context;
use crate::domain::require_identity;
use crate::error::AppError;
use crate::event_sourcing::{AggregateRoot, ExecutionMode, Repository};
use crate::messaging::CommandHandler;

// ============================================================================
// Client Command Handlers
// ============================================================================
//
// Orchestrates: Command -> Aggregate -> Repository (store, then publish)
//
// ============================================================================

pub struct OnCreateClient {
    repository: Repository<Client>,
}

impl OnCreateClient {
    pub fn new(repository: Repository<Client>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<CreateClient> for OnCreateClient {
    async fn handle(&self, ctx: Context, command: CreateClient) -> Result<(), AppError> {
        let identity = require_identity(&ctx)?;
        if identity.user_id != command.user_id {
            return Err(AppError::Forbidden("clients can only be created for yourself".into()));
        }

        let mut client = AggregateRoot::<Client>::new();
        client.execute(
            &ctx,
            &ClientCommand::Create {
                id: command.id,
                user_id: command.user_id,
                secret: command.secret,
                domain: command.domain,
                data: command.data,
            },
        )?;

        self.repository.save(&ctx, ExecutionMode::LIVE, &mut client).await?;
        tracing::info!(client_id = %command.id, user_id = %command.user_id, "✅ Client created");
        Ok(())
    }
}

pub struct OnRemoveClient {
    repository: Repository<Client>,
}

impl OnRemoveClient {
    pub fn new(repository: Repository<Client>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<RemoveClient> for OnRemoveClient {
    async fn handle(&self, ctx: Context, command: RemoveClient) -> Result<(), AppError> {
        let identity = require_identity(&ctx)?;

        let mut client = self.repository.get(&ctx, command.id).await?;
        if client.state().user_id != identity.user_id {
            return Err(AppError::Forbidden("only the owner can remove a client".into()));
        }

        client.execute(&ctx, &ClientCommand::Remove)?;
        self.repository.save(&ctx, ExecutionMode::LIVE, &mut client).await?;
        tracing::info!(client_id = %command.id, version = client.version(), "✅ Client removed");
        Ok(())
    }
}
