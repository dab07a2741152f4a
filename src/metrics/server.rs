use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};

use crate::health::HealthProbe;

struct ServerState {
    registry: Registry,
    readiness: Option<HealthProbe>,
}

/// Start the metrics HTTP server.
/// `/health` answers 503 while the readiness probe (remote broker) is not serving.
pub async fn start_metrics_server(
    registry: Registry,
    readiness: Option<HealthProbe>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    let state = web::Data::new(ServerState { registry, readiness });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(state: web::Data<ServerState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %err, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<ServerState>) -> impl Responder {
    let broker = match &state.readiness {
        Some(probe) => Some((probe.service().to_string(), probe.is_serving().await)),
        None => None,
    };

    let ready = broker.as_ref().map(|(_, serving)| *serving).unwrap_or(true);
    let body = serde_json::json!({
        "status": if ready { "healthy" } else { "unavailable" },
        "service": "cqrs_runtime",
        "broker": broker.map(|(service, serving)| serde_json::json!({
            "service": service,
            "serving": serving,
        })),
    });

    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
