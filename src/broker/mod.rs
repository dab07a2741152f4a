// ============================================================================
// Pub/Sub Broker
// ============================================================================
//
// In-memory fan-out switchboard exposed over gRPC:
// - Publish(topic, payload)  forwards to every live subscriber of topic
// - Subscribe(topic)         server stream until the client goes away
//
// No persistence, no replay of missed payloads, no consumer groups.
//
// ============================================================================

mod message_bus;
mod server;

pub use message_bus::MessageBus;
pub use server::{serve, PubSubService, HEALTH_SERVICE};

/// Generated protobuf types and gRPC stubs for `pubsub.PubSub`.
pub mod pb {
    tonic::include_proto!("pubsub");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("pubsub_descriptor");
}
