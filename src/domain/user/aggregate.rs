use uuid::Uuid;

use super::commands::UserCommand;
use super::errors::UserError;
use super::events::*;
use super::value_objects::EmailAddress;
use crate::event_sourcing::Aggregate;

// ============================================================================
// User Aggregate
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: EmailAddress,
}

impl User {
    fn ensure_registered(&self) -> Result<(), UserError> {
        if self.id.is_nil() {
            return Err(UserError::NotRegistered);
        }
        Ok(())
    }
}

impl Aggregate for User {
    type Event = UserEvent;
    type Command = UserCommand;
    type Error = UserError;
    const STREAM_NAME: &'static str = "User";

    fn id(&self) -> Uuid {
        self.id
    }

    fn apply(self, event: &UserEvent) -> Self {
        match event {
            UserEvent::WasRegisteredWithEmail(e) => User {
                id: e.id,
                email: e.email.clone(),
            },
            UserEvent::EmailAddressWasChanged(e) => User {
                email: e.email.clone(),
                ..self
            },
            UserEvent::AccessTokenWasRequested(_) => self,
        }
    }

    fn handle_command(&self, command: &UserCommand) -> Result<Vec<UserEvent>, UserError> {
        match command {
            UserCommand::RegisterWithEmail { id, email, redirect_path } => {
                if !self.id.is_nil() {
                    return Err(UserError::AlreadyRegistered);
                }
                Ok(vec![UserEvent::WasRegisteredWithEmail(WasRegisteredWithEmail {
                    id: *id,
                    email: email.clone(),
                    redirect_path: redirect_path.clone(),
                })])
            }
            UserCommand::ChangeEmailAddress { email } => {
                self.ensure_registered()?;
                if *email == self.email {
                    return Err(UserError::EmailUnchanged);
                }
                Ok(vec![UserEvent::EmailAddressWasChanged(EmailAddressWasChanged {
                    id: self.id,
                    email: email.clone(),
                })])
            }
            UserCommand::RequestAccessToken { redirect_path } => {
                self.ensure_registered()?;
                Ok(vec![UserEvent::AccessTokenWasRequested(AccessTokenWasRequested {
                    id: self.id,
                    email: self.email.clone(),
                    redirect_path: redirect_path.clone(),
                })])
            }
        }
    }
}
