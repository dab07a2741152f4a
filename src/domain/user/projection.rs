use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::events::{EmailAddressWasChanged, WasRegisteredWithEmail};
use super::value_objects::EmailAddress;
use crate::context::Context;
use crate::event_sourcing::{Event, ExecutionMode};
use crate::messaging::EventHandler;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: EmailAddress,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn add(&self, user: UserView) -> anyhow::Result<()>;
    async fn update_email(&self, id: Uuid, email: EmailAddress) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<UserView>>;
    async fn find_by_email(&self, email: &EmailAddress) -> anyhow::Result<Option<UserView>>;
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    rows: RwLock<HashMap<Uuid, UserView>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn add(&self, user: UserView) -> anyhow::Result<()> {
        self.rows.write().await.insert(user.id, user);
        Ok(())
    }

    async fn update_email(&self, id: Uuid, email: EmailAddress) -> anyhow::Result<()> {
        match self.rows.write().await.get_mut(&id) {
            Some(row) => {
                row.email = email;
                Ok(())
            }
            None => anyhow::bail!("user {id} not projected yet"),
        }
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<UserView>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> anyhow::Result<Option<UserView>> {
        Ok(self.rows.read().await.values().find(|u| &u.email == email).cloned())
    }
}

pub struct WhenUserWasRegisteredWithEmail {
    users: Arc<dyn UserRepository>,
}

impl WhenUserWasRegisteredWithEmail {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl EventHandler for WhenUserWasRegisteredWithEmail {
    async fn handle(&self, _ctx: Context, _mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        let e = event.decode::<WasRegisteredWithEmail>()?;
        self.users.add(UserView { id: e.id, email: e.email }).await
    }
}

pub struct WhenUserEmailAddressWasChanged {
    users: Arc<dyn UserRepository>,
}

impl WhenUserEmailAddressWasChanged {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl EventHandler for WhenUserEmailAddressWasChanged {
    async fn handle(&self, _ctx: Context, _mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        let e = event.decode::<EmailAddressWasChanged>()?;
        self.users.update_email(e.id, e.email).await
    }
}
