use std::time::Duration;

use uuid::Uuid;

use crate::messaging::Command;

// ============================================================================
// Token Domain Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum TokenCommand {
    Create {
        id: Uuid,
        client_id: Uuid,
        user_id: Uuid,
        access: String,
        refresh: String,
        scope: String,
        expires_in: Duration,
        user_agent: Option<String>,
    },
    Remove,
}

#[derive(Debug, Clone)]
pub struct CreateToken {
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub access: String,
    pub refresh: String,
    pub scope: String,
    pub expires_in: Duration,
}

impl CreateToken {
    pub const NAME: &'static str = "token.Create";
}

impl Command for CreateToken {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[derive(Debug, Clone)]
pub struct RemoveToken {
    pub id: Uuid,
}

impl RemoveToken {
    pub const NAME: &'static str = "token.Remove";
}

impl Command for RemoveToken {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}
