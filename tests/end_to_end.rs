use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use cqrs_runtime::domain::{self, client, user, ReadModels, WriteSide};
use cqrs_runtime::event_sourcing::{EventStore, InMemoryEventStore, Replayer};
use cqrs_runtime::messaging::{CommandBus, EventBus, LocalEventBus};
use cqrs_runtime::{AppError, Context, Identity};

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl user::Mailer for RecordingMailer {
    async fn send_magic_link(&self, to: &user::EmailAddress, _link: &str) -> anyhow::Result<()> {
        self.sent.lock().await.push(to.to_string());
        Ok(())
    }
}

struct Runtime {
    store: Arc<InMemoryEventStore>,
    events: Arc<LocalEventBus>,
    commands: CommandBus,
    read_models: ReadModels,
    mailer: Arc<RecordingMailer>,
}

async fn runtime() -> Runtime {
    let store = Arc::new(InMemoryEventStore::new());
    let events = Arc::new(LocalEventBus::new());
    let read_models = ReadModels::in_memory();
    let mailer = Arc::new(RecordingMailer::default());

    let ctx = Context::background();
    for (event_type, handler) in domain::event_handlers(&read_models, mailer.clone(), "https://auth.test/link") {
        events.subscribe(&ctx, &event_type, handler).await.unwrap();
    }

    let commands = CommandBus::new();
    let write = WriteSide {
        store: store.clone(),
        events: events.clone(),
        metrics: None,
    };
    domain::register_command_handlers(&commands, &write, &read_models).await;

    Runtime {
        store,
        events,
        commands,
        read_models,
        mailer,
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn create_client(id: Uuid, user_id: Uuid) -> client::CreateClient {
    client::CreateClient {
        id,
        user_id,
        secret: "secret".into(),
        domain: "https://app.test".into(),
        data: serde_json::json!({}),
    }
}

#[tokio::test]
async fn test_client_create_and_remove_flow() {
    let rt = runtime().await;
    let user_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let ctx = Context::background().with_identity(Identity::user(user_id));

    rt.commands.dispatch(&ctx, create_client(client_id, user_id)).await.unwrap();

    let stream = rt.store.get_stream(client_id, "Client").await.unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream[0].stream_version, 0);
    assert_eq!(stream[0].event_type, "client.WasCreated");
    assert_eq!(
        stream[0].metadata.as_ref().and_then(|m| m.identity.as_ref()).map(|i| i.user_id),
        Some(user_id)
    );

    let clients = rt.read_models.clients.clone();
    eventually(|| {
        let clients = clients.clone();
        async move { clients.get(client_id).await.unwrap().is_some() }
    })
    .await;

    rt.commands.dispatch(&ctx, client::RemoveClient { id: client_id }).await.unwrap();

    let stream = rt.store.get_stream(client_id, "Client").await.unwrap();
    assert_eq!(stream.len(), 2);
    assert_eq!(stream[1].event_type, "client.WasRemoved");
    assert_eq!(stream[1].stream_version, stream[0].stream_version + 1);

    eventually(|| {
        let clients = clients.clone();
        async move { clients.get(client_id).await.unwrap().is_none() }
    })
    .await;
}

#[tokio::test]
async fn test_only_owner_removes_client() {
    let rt = runtime().await;
    let owner = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let owner_ctx = Context::background().with_identity(Identity::user(owner));
    rt.commands.dispatch(&owner_ctx, create_client(client_id, owner)).await.unwrap();

    let stranger = Context::background().with_identity(Identity::user(Uuid::new_v4()));
    let err = rt
        .commands
        .dispatch(&stranger, client::RemoveClient { id: client_id })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let anonymous = rt
        .commands
        .dispatch(&Context::background(), client::RemoveClient { id: client_id })
        .await
        .unwrap_err();
    assert!(matches!(anonymous, AppError::Unauthorized(_)));

    assert_eq!(rt.store.get_stream(client_id, "Client").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_removing_unknown_client_is_not_found() {
    let rt = runtime().await;
    let ctx = Context::background().with_identity(Identity::user(Uuid::new_v4()));
    let err = rt
        .commands
        .dispatch(&ctx, client::RemoveClient { id: Uuid::new_v4() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_magic_link_is_sent_live_but_not_on_replay() {
    let rt = runtime().await;
    let ctx = Context::background();
    let register = || user::RegisterWithEmail {
        email: "Someone@Example.com".into(),
        redirect_path: None,
    };

    // first registration creates the user
    rt.commands.dispatch(&ctx, register()).await.unwrap();
    let users = rt.read_models.users.clone();
    let email = user::EmailAddress::parse("someone@example.com").unwrap();
    eventually(|| {
        let users = users.clone();
        let email = email.clone();
        async move { users.find_by_email(&email).await.unwrap().is_some() }
    })
    .await;
    assert!(rt.mailer.sent.lock().await.is_empty());

    // a known address asks for a new link instead
    rt.commands.dispatch(&ctx, register()).await.unwrap();
    let mailer = rt.mailer.clone();
    eventually(|| {
        let mailer = mailer.clone();
        async move { mailer.sent.lock().await.len() == 1 }
    })
    .await;

    let registry = Arc::new(domain::event_registry());
    let replayer = Replayer::new(rt.store.clone(), rt.events.clone(), registry);
    let report = replayer.replay_all(&ctx).await.unwrap();
    assert_eq!(report.published, 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rt.mailer.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn test_invalid_email_is_rejected() {
    let rt = runtime().await;
    let err = rt
        .commands
        .dispatch(
            &Context::background(),
            user::RegisterWithEmail {
                email: "not-an-email".into(),
                redirect_path: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invalid(_)));
    assert!(rt.store.is_empty().await);
}
