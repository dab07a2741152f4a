// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Command dispatch (throughput, latency, failures by error kind)
// - Event persistence and publication (by event type and bus)
// - Event handler failures
// - Live subscriptions (event bus side and broker side)
//
// Owned by whoever builds the runtime and handed to the components that
// record into it; scraped via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Command Bus Metrics
    pub commands_dispatched: IntCounterVec,
    pub commands_failed: IntCounterVec,
    pub command_duration: HistogramVec,

    // Event Metrics
    pub events_stored: IntCounterVec,
    pub events_published: IntCounterVec,
    pub handler_failures: IntCounterVec,

    // Subscription Metrics
    pub active_subscriptions: IntGauge,
    pub broker_subscribers: IntGaugeVec,
    pub broker_messages: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Command Bus Metrics
        let commands_dispatched = IntCounterVec::new(
            Opts::new("commands_dispatched_total", "Total commands handed to a handler"),
            &["command"],
        )?;
        registry.register(Box::new(commands_dispatched.clone()))?;

        let commands_failed = IntCounterVec::new(
            Opts::new("commands_failed_total", "Total commands that ended with an error"),
            &["command", "kind"],
        )?;
        registry.register(Box::new(commands_failed.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new("command_duration_seconds", "Command handling duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        // Event Metrics
        let events_stored = IntCounterVec::new(
            Opts::new("events_stored_total", "Total events appended to the event store"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_stored.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Total events published to an event bus"),
            &["event_type", "bus"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let handler_failures = IntCounterVec::new(
            Opts::new("event_handler_failures_total", "Total failed event handler invocations"),
            &["event_type"],
        )?;
        registry.register(Box::new(handler_failures.clone()))?;

        // Subscription Metrics
        let active_subscriptions = IntGauge::new(
            "event_bus_active_subscriptions",
            "Event handlers currently subscribed",
        )?;
        registry.register(Box::new(active_subscriptions.clone()))?;

        let broker_subscribers = IntGaugeVec::new(
            Opts::new("broker_subscribers", "Streaming subscribers per broker topic"),
            &["topic"],
        )?;
        registry.register(Box::new(broker_subscribers.clone()))?;

        let broker_messages = IntCounterVec::new(
            Opts::new("broker_messages_total", "Payloads published through the broker"),
            &["topic"],
        )?;
        registry.register(Box::new(broker_messages.clone()))?;

        Ok(Self {
            registry,
            commands_dispatched,
            commands_failed,
            command_duration,
            events_stored,
            events_published,
            handler_failures,
            active_subscriptions,
            broker_subscribers,
            broker_messages,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record the outcome of one command dispatch
    pub fn record_command(&self, command: &str, duration_secs: f64, failure_kind: Option<&str>) {
        self.commands_dispatched.with_label_values(&[command]).inc();
        if let Some(kind) = failure_kind {
            self.commands_failed.with_label_values(&[command, kind]).inc();
        }
        self.command_duration.with_label_values(&[command]).observe(duration_secs);
    }

    pub fn record_event_stored(&self, event_type: &str) {
        self.events_stored.with_label_values(&[event_type]).inc();
    }

    pub fn record_event_published(&self, event_type: &str, bus: &str) {
        self.events_published.with_label_values(&[event_type, bus]).inc();
    }

    pub fn record_handler_failure(&self, event_type: &str) {
        self.handler_failures.with_label_values(&[event_type]).inc();
    }

    pub fn subscription_opened(&self) {
        self.active_subscriptions.inc();
    }

    pub fn subscription_closed(&self) {
        self.active_subscriptions.dec();
    }

    pub fn record_broker_subscribers(&self, topic: &str, count: usize) {
        self.broker_subscribers
            .with_label_values(&[topic])
            .set(count as i64);
    }

    pub fn record_broker_message(&self, topic: &str) {
        self.broker_messages.with_label_values(&[topic]).inc();
    }
}
