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
// Token Read Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenView {
    pub id: Uuid,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub access: String,
    pub refresh: String,
    pub scope: String,
    pub expires_in_secs: u64,
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn add(&self, token: TokenView) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<TokenView>>;
    async fn find_by_access(&self, access: &str) -> anyhow::Result<Option<TokenView>>;
    async fn count(&self, client_id: Uuid) -> anyhow::Result<usize>;
}

#[derive(Default)]
pub struct InMemoryTokenRepository {
    rows: RwLock<HashMap<Uuid, TokenView>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn add(&self, token: TokenView) -> anyhow::Result<()> {
        self.rows.write().await.insert(token.id, token);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.rows.write().await.remove(&id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<TokenView>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_access(&self, access: &str) -> anyhow::Result<Option<TokenView>> {
        Ok(self.rows.read().await.values().find(|t| t.access == access).cloned())
    }

    async fn count(&self, client_id: Uuid) -> anyhow::Result<usize> {
        Ok(self.rows.read().await.values().filter(|t| t.client_id == client_id).count())
    }
}

pub struct WhenTokenWasCreated {
    tokens: Arc<dyn TokenRepository>,
}

impl WhenTokenWasCreated {
    pub fn new(tokens: Arc<dyn TokenRepository>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl EventHandler for WhenTokenWasCreated {
    async fn handle(&self, _ctx: Context, _mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        let e = event.decode::<WasCreated>()?;
        self.tokens
            .add(TokenView {
                id: e.id,
                client_id: e.client_id,
                user_id: e.user_id,
                access: e.access,
                refresh: e.refresh,
                scope: e.scope,
                expires_in_secs: e.expires_in_secs,
            })
            .await
    }
}

pub struct WhenTokenWasRemoved {
    tokens: Arc<dyn TokenRepository>,
}

impl WhenTokenWasRemoved {
    pub fn new(tokens: Arc<dyn TokenRepository>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl EventHandler for WhenTokenWasRemoved {
    async fn handle(&self, _ctx: Context, _mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        let e = event.decode::<WasRemoved>()?;
        self.tokens.delete(e.id).await
    }
}
