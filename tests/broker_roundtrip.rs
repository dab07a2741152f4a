use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use cqrs_runtime::broker::{self, MessageBus, HEALTH_SERVICE};
use cqrs_runtime::event_sourcing::{Event, EventRegistry, ExecutionMode};
use cqrs_runtime::health::{lazy_channel, HealthProbe};
use cqrs_runtime::messaging::{
    handler_fn, EventBus, EventHandler, Registrar, RegistrarConfig, RemoteEventBus,
};
use cqrs_runtime::{Context, Identity};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Rang {
    times: u32,
}
cqrs_runtime::named_event!(Rang => "bell.Rang");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cracked {}
cqrs_runtime::named_event!(Cracked => "bell.Cracked");

struct Broker {
    addr: SocketAddr,
    bus: Arc<MessageBus>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Broker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bus = Arc::new(MessageBus::new(64));
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(broker::serve(listener, bus.clone(), async move {
            let _ = rx.await;
        }));
        Self {
            addr,
            bus,
            shutdown: Some(tx),
            task,
        }
    }

    fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

fn remote_bus(broker: &Broker, registry: EventRegistry) -> (Arc<dyn EventBus>, HealthProbe) {
    let channel = lazy_channel(&broker.endpoint(), Duration::from_secs(1)).unwrap();
    let probe = HealthProbe::new(channel.clone(), HEALTH_SERVICE);
    let bus: Arc<dyn EventBus> = Arc::new(RemoteEventBus::new(channel, Arc::new(registry), Duration::from_secs(2)));
    (bus, probe)
}

fn forwarding(tx: mpsc::UnboundedSender<(Event, ExecutionMode, Option<Identity>)>) -> Arc<dyn EventHandler> {
    handler_fn(move |ctx: Context, mode, event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((event, mode, ctx.identity().cloned()));
            Ok(())
        }
    })
}

async fn wait_for_subscribers(bus: &MessageBus, topic: &str, expected: usize) {
    for _ in 0..200 {
        if bus.subscriber_count(topic).await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{topic} never reached {expected} subscribers");
}

#[tokio::test]
async fn test_registrar_delivers_remote_events() {
    let broker = Broker::start().await;
    let mut registry = EventRegistry::new();
    registry.register::<Rang>();
    let (bus, probe) = remote_bus(&broker, registry);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handlers: HashMap<String, Arc<dyn EventHandler>> = HashMap::new();
    handlers.insert("bell.Rang".into(), forwarding(tx));

    let (ctx, cancel) = Context::background().with_cancel();
    let registrar = Registrar::new(bus.clone(), probe.clone(), RegistrarConfig::default());
    let tasks = registrar.register(&ctx, handlers).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(probe.is_serving().await);
    wait_for_subscribers(&broker.bus, "bell.Rang", 1).await;

    let user_id = Uuid::new_v4();
    let publisher = Context::background().with_identity(Identity::user(user_id));
    let stream_id = Uuid::new_v4();
    let event = Event::new(stream_id, "Bell", 0, &Rang { times: 3 })
        .unwrap()
        .with_metadata(cqrs_runtime::event_sourcing::EventMetadata::from_context(&publisher));
    bus.publish(&publisher, ExecutionMode::REPLAY, &event).await.unwrap();

    let (received, mode, identity) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.id, event.id);
    assert_eq!(received.decode::<Rang>().unwrap().times, 3);
    assert!(mode.is_replay());
    assert_eq!(identity.map(|i| i.user_id), Some(user_id));

    cancel.cancel();
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
    broker.stop().await;
}

#[tokio::test]
async fn test_unregistered_event_type_is_skipped() {
    let broker = Broker::start().await;
    let mut registry = EventRegistry::new();
    registry.register::<Rang>();
    let (bus, _probe) = remote_bus(&broker, registry);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (ctx, cancel) = Context::background().with_cancel();
    let subscription = bus.subscribe(&ctx, "bell.Cracked", forwarding(tx)).await.unwrap();
    wait_for_subscribers(&broker.bus, "bell.Cracked", 1).await;

    let event = Event::new(Uuid::new_v4(), "Bell", 0, &Cracked {}).unwrap();
    bus.publish(&ctx, ExecutionMode::LIVE, &event).await.unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(nothing.is_err());

    bus.unsubscribe(&ctx, "bell.Cracked", subscription.id()).await.unwrap();
    assert!(subscription.closed().await.is_ok());

    cancel.cancel();
    broker.stop().await;
}

#[tokio::test]
async fn test_fan_out_to_every_subscriber() {
    let broker = Broker::start().await;
    let mut registry = EventRegistry::new();
    registry.register::<Rang>();
    let (bus, _probe) = remote_bus(&broker, registry);
    let (ctx, cancel) = Context::background().with_cancel();

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    bus.subscribe(&ctx, "bell.Rang", forwarding(tx_a)).await.unwrap();
    bus.subscribe(&ctx, "bell.Rang", forwarding(tx_b)).await.unwrap();
    wait_for_subscribers(&broker.bus, "bell.Rang", 2).await;

    for times in 1..=3 {
        let event = Event::new(Uuid::new_v4(), "Bell", 0, &Rang { times }).unwrap();
        bus.publish(&ctx, ExecutionMode::LIVE, &event).await.unwrap();
    }

    for rx in [&mut rx_a, &mut rx_b] {
        let mut seen = Vec::new();
        for _ in 0..3 {
            let (event, mode, _) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(mode.is_live());
            seen.push(event.decode::<Rang>().unwrap().times);
        }
        // one receive loop per subscription handles its stream in order
        assert_eq!(seen, vec![1, 2, 3]);
    }

    cancel.cancel();
    broker.stop().await;
}
