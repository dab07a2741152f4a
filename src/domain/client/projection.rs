use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::events::{WasCreated, WasRemoved};
use crate::context::Context;
use crate::event_sourcing::{Event, ExecutionMode};
use crate::messaging::EventHandler;

// ============================================================================
// Client Read Model
// ============================================================================
//
// Rows are keyed by client id, so applying the same event twice (replay,
// redelivery) leaves the same row behind.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub secret: String,
    pub domain: String,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn add(&self, client: ClientView) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ClientView>>;
    /// Clients owned by `user_id`.
    async fn count(&self, user_id: Uuid) -> anyhow::Result<usize>;
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    rows: RwLock<HashMap<Uuid, ClientView>>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn add(&self, client: ClientView) -> anyhow::Result<()> {
        self.rows.write().await.insert(client.id, client);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.rows.write().await.remove(&id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ClientView>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn count(&self, user_id: Uuid) -> anyhow::Result<usize> {
        Ok(self.rows.read().await.values().filter(|c| c.user_id == user_id).count())
    }
}

pub struct WhenClientWasCreated {
    clients: Arc<dyn ClientRepository>,
}

impl WhenClientWasCreated {
    pub fn new(clients: Arc<dyn ClientRepository>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl EventHandler for WhenClientWasCreated {
    async fn handle(&self, _ctx: Context, mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        let e = event.decode::<WasCreated>()?;
        tracing::debug!(client_id = %e.id, mode = %mode, "[EventHandler] client.WasCreated");

        self.clients
            .add(ClientView {
                id: e.id,
                user_id: e.user_id,
                secret: e.secret,
                domain: e.domain,
                data: e.data,
            })
            .await
    }
}

pub struct WhenClientWasRemoved {
    clients: Arc<dyn ClientRepository>,
}

impl WhenClientWasRemoved {
    pub fn new(clients: Arc<dyn ClientRepository>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl EventHandler for WhenClientWasRemoved {
    async fn handle(&self, _ctx: Context, mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        let e = event.decode::<WasRemoved>()?;
        tracing::debug!(client_id = %e.id, mode = %mode, "[EventHandler] client.WasRemoved");
        self.clients.delete(e.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: Uuid, user_id: Uuid) -> Event {
        let raw = WasCreated {
            id,
            user_id,
            secret: "s".into(),
            domain: "d".into(),
            data: serde_json::Value::Null,
        };
        Event::new(id, "Client", 0, &raw).unwrap()
    }

    #[tokio::test]
    async fn test_projection_is_idempotent() {
        let clients = Arc::new(InMemoryClientRepository::new());
        let handler = WhenClientWasCreated::new(clients.clone());
        let (id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        let event = created(id, user_id);

        handler.handle(Context::background(), ExecutionMode::LIVE, event.clone()).await.unwrap();
        handler.handle(Context::background(), ExecutionMode::REPLAY, event).await.unwrap();

        assert_eq!(clients.count(user_id).await.unwrap(), 1);
        assert_eq!(clients.get(id).await.unwrap().unwrap().secret, "s");
    }

    #[tokio::test]
    async fn test_removed_deletes_row() {
        let clients = Arc::new(InMemoryClientRepository::new());
        let (id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        WhenClientWasCreated::new(clients.clone())
            .handle(Context::background(), ExecutionMode::LIVE, created(id, user_id))
            .await
            .unwrap();

        let removed = Event::new(id, "Client", 1, &WasRemoved { id }).unwrap();
        WhenClientWasRemoved::new(clients.clone())
            .handle(Context::background(), ExecutionMode::LIVE, removed)
            .await
            .unwrap();

        assert!(clients.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_event_type_is_error() {
        let clients = Arc::new(InMemoryClientRepository::new());
        let id = Uuid::new_v4();
        let removed = Event::new(id, "Client", 1, &WasRemoved { id }).unwrap();

        let result = WhenClientWasCreated::new(clients)
            .handle(Context::background(), ExecutionMode::LIVE, removed)
            .await;
        assert!(result.is_err());
    }
}
