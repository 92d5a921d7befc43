use actix::Actor;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod config;
mod domain;
mod messaging;
mod metrics;
mod storage;
mod utils;

use actors::{CoordinatorActor, GetDlqActor, Shutdown};
use config::Config;
use domain::shipment::FulfillmentCoordinator;
use messaging::KafkaNotificationPublisher;
use storage::ScyllaShipmentRepository;

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering.
    // Override with e.g. RUST_LOG=logistics_fulfillment=trace.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,logistics_fulfillment=debug")),
        )
        .init();

    tracing::info!("Starting logistics fulfillment service");

    let config = Config::from_env();
    tracing::info!(
        brokers = %config.kafka.brokers,
        order_events_topic = %config.kafka.order_events_topic,
        keyspace = %config.scylla.keyspace,
        workers = config.consumer.workers,
        "Configuration loaded"
    );

    // === 1. ScyllaDB session and schema ===
    tracing::info!("Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new()
        .known_node(&config.scylla.node)
        .build()
        .await?;
    storage::init_schema(&session, &config.scylla.keyspace).await?;
    let session = Arc::new(session);

    // === 2. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);

    // === 3. Ports: storage and outbound publisher ===
    let repository = Arc::new(ScyllaShipmentRepository::new(session.clone()));
    let publisher = Arc::new(KafkaNotificationPublisher::new(&config.kafka, metrics.clone())?);

    // === 4. Business coordinator over the ports ===
    let fulfillment = Arc::new(FulfillmentCoordinator::new(repository, publisher.clone()));

    // === 5. Supervision: DLQ, health, consumer workers ===
    let coordinator = CoordinatorActor::new(
        session.clone(),
        config.clone(),
        fulfillment,
        publisher,
        metrics.clone(),
    )
    .start();

    let dlq = coordinator
        .send(GetDlqActor)
        .await?
        .expect("DLQ actor should be started by coordinator");

    // === 6. Admin HTTP server (metrics, health, DLQ inspection) ===
    // Separate runtime thread so scraping never competes with the consumer.
    let registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("admin server runtime");
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(registry, dlq, metrics_port).await {
                tracing::error!("Admin server error: {}", e);
            }
        });
    });

    tracing::info!("Service running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Ctrl-C received, shutting down");
    coordinator
        .send(Shutdown)
        .await?
        .map_err(|e| anyhow::anyhow!("shutdown failed: {}", e))?;

    Ok(())
}
