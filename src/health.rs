use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

// ============================================================================
// gRPC Health Probe
// ============================================================================
//
// A remote connection is usable only once its standard health service
// reports SERVING for the named service. Used by the registrar before it
// subscribes and by the /health readiness endpoint.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct HealthProbe {
    channel: Channel,
    service: String,
}

impl HealthProbe {
    pub fn new(channel: Channel, service: impl Into<String>) -> Self {
        Self {
            channel,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// True when the remote health service answers SERVING.
    pub async fn is_serving(&self) -> bool {
        is_connection_serving(self.channel.clone(), &self.service).await
    }
}

pub async fn is_connection_serving(channel: Channel, service: &str) -> bool {
    let mut client = HealthClient::new(channel);
    let request = HealthCheckRequest {
        service: service.to_string(),
    };

    match client.check(request).await {
        Ok(response) => response.into_inner().status == ServingStatus::Serving as i32,
        Err(status) => {
            tracing::debug!(service, error = %status, "Health check failed");
            false
        }
    }
}

/// Lazily connected channel: the first RPC dials, later RPCs reconnect.
pub fn lazy_channel(addr: &str, connect_timeout: Duration) -> Result<Channel, tonic::transport::Error> {
    Ok(Endpoint::from_shared(addr.to_string())?
        .connect_timeout(connect_timeout)
        .connect_lazy())
}
