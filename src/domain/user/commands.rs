use uuid::Uuid;

use super::value_objects::EmailAddress;
use crate::messaging::Command;

// ============================================================================
// User Domain Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum UserCommand {
    RegisterWithEmail {
        id: Uuid,
        email: EmailAddress,
        redirect_path: Option<String>,
    },
    ChangeEmailAddress {
        email: EmailAddress,
    },
    RequestAccessToken {
        redirect_path: Option<String>,
    },
}

/// Registers a new user, or asks for a fresh magic link when the address
/// is already known.
#[derive(Debug, Clone)]
pub struct RegisterWithEmail {
    pub email: String,
    pub redirect_path: Option<String>,
}

impl RegisterWithEmail {
    pub const NAME: &'static str = "user.RegisterWithEmail";
}

impl Command for RegisterWithEmail {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[derive(Debug, Clone)]
pub struct ChangeEmailAddress {
    pub id: Uuid,
    pub email: String,
}

impl ChangeEmailAddress {
    pub const NAME: &'static str = "user.ChangeEmailAddress";
}

impl Command for ChangeEmailAddress {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[derive(Debug, Clone)]
pub struct RequestAccessToken {
    pub id: Uuid,
    pub redirect_path: Option<String>,
}

impl RequestAccessToken {
    pub const NAME: &'static str = "user.RequestAccessToken";
}

impl Command for RequestAccessToken {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}
