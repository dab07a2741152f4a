use std::sync::Arc;
use std::time::Duration;

use cqrs_runtime::broker::HEALTH_SERVICE;
use cqrs_runtime::config::{AppConfig, BusBackend, StoreBackend};
use cqrs_runtime::domain::{self, client, user, ReadModels, WriteSide};
use cqrs_runtime::event_sourcing::{
    EventRegistry, EventStore, InMemoryEventStore, MongoEventStore, PostgresEventStore, Replayer,
};
use cqrs_runtime::health::{lazy_channel, HealthProbe};
use cqrs_runtime::messaging::{
    CommandBus, EventBus, EventHandler, LocalEventBus, Registrar, RegistrarConfig, RemoteEventBus,
};
use cqrs_runtime::metrics::{start_metrics_server, Metrics};
use cqrs_runtime::{telemetry, Context, Identity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter, e.g. RUST_LOG=debug
    telemetry::init_tracing("info,cqrs_runtime=debug");

    tracing::info!("🚀 Starting event-sourced CQRS demo service");

    let config = AppConfig::from_env()?;
    tracing::info!(store = ?config.store, bus = ?config.bus, "Configuration loaded");

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let registry = Arc::new(domain::event_registry());
    tracing::info!(event_types = ?registry.event_types(), "Event registry built");

    // === 2. Event store ===
    let store = build_store(&config.store).await?;

    // === 3. Event bus + read side ===
    let (ctx, cancel) = Context::background().with_cancel();
    let read_models = ReadModels::in_memory();
    let handlers = domain::event_handlers(&read_models, Arc::new(user::LogMailer), &config.magic_link_base_url);

    let (events, readiness) = build_event_bus(&config, &ctx, registry.clone(), metrics.clone(), handlers).await?;

    // === 4. Metrics + readiness endpoint ===
    spawn_metrics_server(metrics.clone(), readiness, config.metrics_port);

    // === 5. Command bus ===
    let commands = CommandBus::new().with_metrics(metrics.clone());
    let write = WriteSide {
        store: store.clone(),
        events: events.clone(),
        metrics: Some(metrics.clone()),
    };
    domain::register_command_handlers(&commands, &write, &read_models).await;

    // === 6. Demonstrate the write -> read flow ===
    run_demo(&ctx, &config, &commands, &read_models).await?;

    // === 7. Rebuild projections from history (REPLAY: no mail goes out) ===
    let replayer = Replayer::new(store, events, registry);
    match replayer.replay_all(&ctx).await {
        Ok(report) => tracing::info!(published = report.published, skipped = report.skipped, "Projections replayed"),
        Err(err) => tracing::warn!(error = %err, "Replay skipped"),
    }

    tracing::info!("🎉 Demo complete, press Ctrl-C to exit");
    tokio::signal::ctrl_c().await?;
    cancel.cancel();

    Ok(())
}

async fn build_store(backend: &StoreBackend) -> anyhow::Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match backend {
        StoreBackend::Memory => Arc::new(InMemoryEventStore::new()),
        StoreBackend::Postgres { url, max_connections } => {
            tracing::info!("Connecting to PostgreSQL...");
            let store = PostgresEventStore::connect(url, *max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Mongo { uri, database } => {
            tracing::info!("Connecting to MongoDB...");
            let store = MongoEventStore::connect(uri, database).await?;
            store.ensure_indexes().await?;
            Arc::new(store)
        }
    };
    tracing::info!("✅ Event store ready");
    Ok(store)
}

async fn build_event_bus(
    config: &AppConfig,
    ctx: &Context,
    registry: Arc<EventRegistry>,
    metrics: Arc<Metrics>,
    handlers: std::collections::HashMap<String, Arc<dyn EventHandler>>,
) -> anyhow::Result<(Arc<dyn EventBus>, Option<HealthProbe>)> {
    match &config.bus {
        BusBackend::Local => {
            let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new().with_metrics(metrics));
            for (event_type, handler) in handlers {
                bus.subscribe(ctx, &event_type, handler).await?;
            }
            Ok((bus, None))
        }
        BusBackend::Remote { addr } => {
            tracing::info!(addr = %addr, "Connecting to Pub/Sub broker...");
            let channel = lazy_channel(addr, Duration::from_secs(5))?;
            let probe = HealthProbe::new(channel.clone(), HEALTH_SERVICE);

            let bus: Arc<dyn EventBus> = Arc::new(
                RemoteEventBus::new(channel, registry, config.event_handler_timeout).with_metrics(metrics),
            );
            let registrar = Registrar::new(
                bus.clone(),
                probe.clone(),
                RegistrarConfig {
                    setup_timeout: config.subscription_setup_timeout,
                    resubscribe_delay: config.resubscribe_delay,
                    ..Default::default()
                },
            );
            // subscription tasks live as long as `ctx`
            registrar.register(ctx, handlers).await?;
            Ok((bus, Some(probe)))
        }
    }
}

fn spawn_metrics_server(metrics: Arc<Metrics>, readiness: Option<HealthProbe>, port: u16) {
    let registry = metrics.registry().clone();
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        system.block_on(async move {
            if let Err(e) = start_metrics_server(registry, readiness, port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });
}

async fn run_demo(
    ctx: &Context,
    config: &AppConfig,
    commands: &CommandBus,
    read_models: &ReadModels,
) -> anyhow::Result<()> {
    tracing::info!("📝 Demonstrating client lifecycle");

    let user_id = uuid::Uuid::new_v4();
    let client_id = uuid::Uuid::new_v4();
    let request = ctx
        .clone()
        .with_identity(Identity::user(user_id))
        .with_timeout(config.command_timeout);

    commands
        .dispatch(
            &request,
            client::CreateClient {
                id: client_id,
                user_id,
                secret: uuid::Uuid::new_v4().simple().to_string(),
                domain: "http://localhost:3000".into(),
                data: serde_json::json!({ "name": "demo" }),
            },
        )
        .await?;
    tracing::info!("✅ Client created: {}", client_id);

    // projections are eventually consistent
    tokio::time::sleep(Duration::from_millis(200)).await;
    let view = read_models.clients.get(client_id).await?;
    tracing::info!(client = ?view, owned = read_models.clients.count(user_id).await?, "Client read model");

    commands.dispatch(&request, client::RemoveClient { id: client_id }).await?;
    tracing::info!("✅ Client removed: {}", client_id);

    tokio::time::sleep(Duration::from_millis(200)).await;
    tracing::info!(present = read_models.clients.get(client_id).await?.is_some(), "Client read model after removal");

    tracing::info!("📝 Demonstrating magic-link registration");
    for _ in 0..2 {
        // the second registration of a known address asks for a new link
        commands
            .dispatch(
                &request,
                user::RegisterWithEmail {
                    email: "demo@example.com".into(),
                    redirect_path: Some("/users/me".into()),
                },
            )
            .await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    Ok(())
}
