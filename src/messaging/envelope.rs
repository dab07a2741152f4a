use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{Context, RequestMetadata};
use crate::event_sourcing::{Event, ExecutionMode};

/// Broker payload: `{event, request_metadata?, execution_mode}` as JSON.
/// A missing `execution_mode` reads as LIVE.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event: Event,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_metadata: Option<RequestMetadata>,

    #[serde(default = "ExecutionMode::live")]
    pub execution_mode: ExecutionMode,
}

impl Envelope {
    pub fn new(ctx: &Context, mode: ExecutionMode, event: Event) -> Self {
        Self {
            event,
            request_metadata: ctx.metadata().cloned(),
            execution_mode: mode,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Fresh handler context: request metadata and identity travel with the
    /// envelope, the deadline is the handler bound.
    pub fn handler_context(&self, handler_timeout: Duration) -> Context {
        let mut ctx = Context::background().with_timeout(handler_timeout);
        if let Some(metadata) = &self.request_metadata {
            ctx = ctx.with_metadata(metadata.clone());
        }
        if let Some(identity) = self.event.metadata.as_ref().and_then(|m| m.identity.clone()) {
            ctx = ctx.with_identity(identity);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Rang {}
    crate::named_event!(Rang => "test.Rang");

    #[test]
    fn test_missing_mode_defaults_to_live() {
        let event = Event::new(Uuid::new_v4(), "Bell", 0, &Rang {}).unwrap();
        let raw = serde_json::json!({ "event": event });

        let envelope = Envelope::from_bytes(raw.to_string().as_bytes()).unwrap();
        assert_eq!(envelope.execution_mode, ExecutionMode::LIVE);
        assert!(envelope.request_metadata.is_none());
    }

    #[test]
    fn test_metadata_reaches_handler_context() {
        let event = Event::new(Uuid::new_v4(), "Bell", 0, &Rang {}).unwrap();
        let ctx = Context::background().with_metadata(RequestMetadata {
            trace_id: Some("abc".into()),
            ..Default::default()
        });

        let envelope = Envelope::new(&ctx, ExecutionMode::REPLAY, event);
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, envelope);

        let handler_ctx = decoded.handler_context(Duration::from_secs(1));
        assert_eq!(handler_ctx.metadata().unwrap().trace_id.as_deref(), Some("abc"));
        assert!(handler_ctx.deadline().is_some());
    }
}
