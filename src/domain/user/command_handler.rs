use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::aggregate::User;
use super::commands::{ChangeEmailAddress, RegisterWithEmail, RequestAccessToken, UserCommand};
use super::projection::UserRepository;
use super::value_objects::EmailAddress;
use crate::context::Context;
use crate::domain::require_identity;
use crate::error::AppError;
use crate::event_sourcing::{AggregateRoot, ExecutionMode, Repository};
use crate::messaging::CommandHandler;

// ============================================================================
// User Command Handlers
// ============================================================================
//
// E-mail uniqueness is checked against the read model, so it holds only as
// far as the projection has caught up.
//
// ============================================================================

pub struct OnRegisterWithEmail {
    repository: Repository<User>,
    users: Arc<dyn UserRepository>,
}

impl OnRegisterWithEmail {
    pub fn new(repository: Repository<User>, users: Arc<dyn UserRepository>) -> Self {
        Self { repository, users }
    }
}

#[async_trait]
impl CommandHandler<RegisterWithEmail> for OnRegisterWithEmail {
    async fn handle(&self, ctx: Context, command: RegisterWithEmail) -> Result<(), AppError> {
        let email = EmailAddress::parse(&command.email)?;
        let known = self.users.find_by_email(&email).await.map_err(AppError::internal)?;

        let mut user = match known {
            Some(existing) => {
                let mut user = self.repository.get(&ctx, existing.id).await?;
                user.execute(
                    &ctx,
                    &UserCommand::RequestAccessToken {
                        redirect_path: command.redirect_path,
                    },
                )?;
                user
            }
            None => {
                let mut user = AggregateRoot::<User>::new();
                user.execute(
                    &ctx,
                    &UserCommand::RegisterWithEmail {
                        id: Uuid::new_v4(),
                        email,
                        redirect_path: command.redirect_path,
                    },
                )?;
                user
            }
        };

        self.repository.save(&ctx, ExecutionMode::LIVE, &mut user).await?;
        tracing::info!(user_id = %user.id(), version = user.version(), "✅ User registered with email");
        Ok(())
    }
}

pub struct OnChangeEmailAddress {
    repository: Repository<User>,
    users: Arc<dyn UserRepository>,
}

impl OnChangeEmailAddress {
    pub fn new(repository: Repository<User>, users: Arc<dyn UserRepository>) -> Self {
        Self { repository, users }
    }
}

#[async_trait]
impl CommandHandler<ChangeEmailAddress> for OnChangeEmailAddress {
    async fn handle(&self, ctx: Context, command: ChangeEmailAddress) -> Result<(), AppError> {
        let identity = require_identity(&ctx)?;
        if identity.user_id != command.id {
            return Err(AppError::Forbidden("users can only change their own email address".into()));
        }

        let email = EmailAddress::parse(&command.email)?;
        if self.users.find_by_email(&email).await.map_err(AppError::internal)?.is_some() {
            return Err(AppError::Invalid(format!("email address {email} is already in use")));
        }

        let mut user = self.repository.get(&ctx, command.id).await?;
        user.execute(&ctx, &UserCommand::ChangeEmailAddress { email })?;
        self.repository.save(&ctx, ExecutionMode::LIVE, &mut user).await?;
        Ok(())
    }
}

pub struct OnRequestAccessToken {
    repository: Repository<User>,
}

impl OnRequestAccessToken {
    pub fn new(repository: Repository<User>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<RequestAccessToken> for OnRequestAccessToken {
    async fn handle(&self, ctx: Context, command: RequestAccessToken) -> Result<(), AppError> {
        let mut user = self.repository.get(&ctx, command.id).await?;
        user.execute(
            &ctx,
            &UserCommand::RequestAccessToken {
                redirect_path: command.redirect_path,
            },
        )?;
        self.repository.save(&ctx, ExecutionMode::LIVE, &mut user).await?;
        Ok(())
    }
}
