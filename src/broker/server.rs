use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use super::message_bus::MessageBus;
use super::pb::pub_sub_server::{PubSub, PubSubServer};
use super::pb::{PublishRequest, PublishResponse, SubscribeRequest, SubscribeResponse};

/// Service name reported SERVING on the standard health endpoint.
pub const HEALTH_SERVICE: &str = "pubsub";

type PayloadStream = Pin<Box<dyn Stream<Item = Result<SubscribeResponse, Status>> + Send>>;

pub struct PubSubService {
    bus: Arc<MessageBus>,
}

impl PubSubService {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[tonic::async_trait]
impl PubSub for PubSubService {
    async fn publish(&self, request: Request<PublishRequest>) -> Result<Response<PublishResponse>, Status> {
        let PublishRequest { topic, payload } = request.into_inner();
        if topic.is_empty() {
            return Err(Status::invalid_argument("topic is required"));
        }

        let delivered = self.bus.publish(&topic, payload).await;
        tracing::debug!(topic = %topic, delivered, "[grpc|Publish]");
        Ok(Response::new(PublishResponse {}))
    }

    type SubscribeStream = PayloadStream;

    async fn subscribe(&self, request: Request<SubscribeRequest>) -> Result<Response<Self::SubscribeStream>, Status> {
        let topic = request.into_inner().topic;
        if topic.is_empty() {
            return Err(Status::invalid_argument("topic is required"));
        }

        // the queue closes when the client disconnects; the bus drops the
        // subscriber on its next publish
        let (_, rx) = self.bus.subscribe(&topic).await;
        let stream = ReceiverStream::new(rx).map(|payload| Ok(SubscribeResponse { payload }));

        Ok(Response::new(Box::pin(stream)))
    }
}

/// Serves PubSub, health and reflection on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, bus: Arc<MessageBus>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let (reporter, health_service) = tonic_health::server::health_reporter();
    reporter
        .set_service_status(HEALTH_SERVICE, tonic_health::ServingStatus::Serving)
        .await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(super::pb::FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "🚀 Pub/Sub broker listening");

    Server::builder()
        .add_service(health_service)
        .add_service(reflection)
        .add_service(PubSubServer::new(PubSubService::new(bus)))
        .serve_with_incoming_shutdown(TcpIncoming::from(listener), shutdown)
        .await?;

    tracing::info!("✅ Pub/Sub broker stopped");
    Ok(())
}
