use async_trait::async_trait;
use uuid::Uuid;

use super::aggregate::Token;
use super::commands::{CreateToken, RemoveToken, TokenCommand};
use crate::context::Context;
use crate::domain::require_identity;
use crate::error::AppError;
use crate::event_sourcing::{AggregateRoot, ExecutionMode, Repository};
use crate::messaging::CommandHandler;

pub struct OnCreateToken {
    repository: Repository<Token>,
}

impl OnCreateToken {
    pub fn new(repository: Repository<Token>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<CreateToken> for OnCreateToken {
    async fn handle(&self, ctx: Context, command: CreateToken) -> Result<(), AppError> {
        let id = Uuid::new_v4();
        let user_agent = ctx.metadata().and_then(|m| m.user_agent.clone());

        let mut token = AggregateRoot::<Token>::new();
        token.execute(
            &ctx,
            &TokenCommand::Create {
                id,
                client_id: command.client_id,
                user_id: command.user_id,
                access: command.access,
                refresh: command.refresh,
                scope: command.scope,
                expires_in: command.expires_in,
                user_agent,
            },
        )?;

        self.repository.save(&ctx, ExecutionMode::LIVE, &mut token).await?;
        tracing::info!(token_id = %id, client_id = %command.client_id, "✅ Token created");
        Ok(())
    }
}

pub struct OnRemoveToken {
    repository: Repository<Token>,
}

impl OnRemoveToken {
    pub fn new(repository: Repository<Token>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<RemoveToken> for OnRemoveToken {
    async fn handle(&self, ctx: Context, command: RemoveToken) -> Result<(), AppError> {
        let identity = require_identity(&ctx)?;

        let mut token = self.repository.get(&ctx, command.id).await?;
        if token.state().user_id != identity.user_id {
            return Err(AppError::Forbidden("only the owner can remove a token".into()));
        }

        token.execute(&ctx, &TokenCommand::Remove)?;
        self.repository.save(&ctx, ExecutionMode::LIVE, &mut token).await?;
        tracing::info!(token_id = %command.id, "✅ Token removed");
        Ok(())
    }
}
