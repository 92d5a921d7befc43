use actix::Addr;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use crate::actors::{DlqActor, GetDeadLetters, GetDlqStats};

/// Serve /metrics, /health and the dead-letter inspection endpoints.
/// Runs on its own runtime thread so the admin surface stays responsive
/// regardless of consumer load.
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    dlq: Addr<DlqActor>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("Starting admin server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(dlq.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
            .route("/dlq", web::get().to(dead_letters_handler))
            .route("/dlq/stats", web::get().to(dlq_stats_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("encode error: {}", e));
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "logistics-fulfillment"
    }))
}

async fn dead_letters_handler(dlq: web::Data<Addr<DlqActor>>) -> impl Responder {
    match dlq.send(GetDeadLetters { limit: 100 }).await {
        Ok(Ok(records)) => HttpResponse::Ok().json(records),
        Ok(Err(e)) => HttpResponse::InternalServerError().body(e),
        Err(e) => HttpResponse::ServiceUnavailable().body(e.to_string()),
    }
}

async fn dlq_stats_handler(dlq: web::Data<Addr<DlqActor>>) -> impl Responder {
    match dlq.send(GetDlqStats).await {
        Ok(Ok(stats)) => HttpResponse::Ok().json(stats),
        Ok(Err(e)) => HttpResponse::InternalServerError().body(e),
        Err(e) => HttpResponse::ServiceUnavailable().body(e.to_string()),
    }
}
