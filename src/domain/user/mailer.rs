use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::events::AccessTokenWasRequested;
use super::value_objects::EmailAddress;
use crate::context::Context;
use crate::event_sourcing::{Event, ExecutionMode};
use crate::messaging::EventHandler;

// ============================================================================
// Magic Link Delivery
// ============================================================================
//
// Sending mail is the side effect that must never repeat on replay: the
// handler only acts when the publishing save was LIVE.
//
// ============================================================================

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_magic_link(&self, to: &EmailAddress, link: &str) -> anyhow::Result<()>;
}

/// Writes the link to the log instead of sending mail.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_magic_link(&self, to: &EmailAddress, link: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, link, "📧 Magic link");
        Ok(())
    }
}

pub struct WhenUserAccessTokenWasRequested {
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl WhenUserAccessTokenWasRequested {
    pub fn new(mailer: Arc<dyn Mailer>, base_url: impl Into<String>) -> Self {
        Self {
            mailer,
            base_url: base_url.into(),
        }
    }

    fn magic_link(&self, e: &AccessTokenWasRequested) -> String {
        let mut link = format!("{}?authToken={}", self.base_url, Uuid::new_v4().simple());
        if let Some(path) = &e.redirect_path {
            link.push_str("&redirect=");
            link.push_str(path);
        }
        link
    }
}

#[async_trait]
impl EventHandler for WhenUserAccessTokenWasRequested {
    async fn handle(&self, _ctx: Context, mode: ExecutionMode, event: Event) -> anyhow::Result<()> {
        let e = event.decode::<AccessTokenWasRequested>()?;
        if !mode.is_live() {
            tracing::debug!(user_id = %e.id, mode = %mode, "Magic link suppressed outside LIVE");
            return Ok(());
        }

        let link = self.magic_link(&e);
        self.mailer.send_magic_link(&e.email, &link).await
    }
}
