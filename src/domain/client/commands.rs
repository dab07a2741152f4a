use uuid::Uuid;

use crate::messaging::Command;

// ============================================================================
// Client Domain Commands
// ============================================================================

/// Business-rule input of the Client aggregate.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Create {
        id: Uuid,
        user_id: Uuid,
        secret: String,
        domain: String,
        data: serde_json::Value,
    },
    Remove,
}

#[derive(Debug, Clone)]
pub struct CreateClient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub secret: String,
    pub domain: String,
    pub data: serde_json::Value,
}

impl Command for CreateClient {
    fn name(&self) -> &'static str {
        CreateClient::NAME
    }
}

impl CreateClient {
    pub const NAME: &'static str = "client.Create";
}

#[derive(Debug, Clone)]
pub struct RemoveClient {
    pub id: Uuid,
}

impl Command for RemoveClient {
    fn name(&self) -> &'static str {
        RemoveClient::NAME
    }
}

impl RemoveClient {
    pub const NAME: &'static str = "client.Remove";
}
