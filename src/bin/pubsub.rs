use std::sync::Arc;

use tokio::net::TcpListener;

use cqrs_runtime::broker::{self, MessageBus};
use cqrs_runtime::config::AppConfig;
use cqrs_runtime::metrics::{start_metrics_server, Metrics};
use cqrs_runtime::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing("info,cqrs_runtime=debug");

    let config = AppConfig::from_env()?;
    tracing::info!("🚀 Starting Pub/Sub broker");

    let metrics = Arc::new(Metrics::new()?);
    let registry = metrics.registry().clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async move {
            if let Err(e) = start_metrics_server(registry, None, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    let bus = Arc::new(MessageBus::new(config.broker_queue_size).with_metrics(metrics));
    let listener = TcpListener::bind(config.pubsub_listen_addr).await?;

    broker::serve(listener, bus, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
        }
        tracing::info!("🛑 Shutdown signal received");
    })
    .await
}
