use actix::prelude::*;
use scylla::client::session::Session;
use std::sync::Arc;
use tokio::sync::watch;

use super::consumer_worker::{run_supervised, WorkerContext};
use super::dlq::DlqActor;
use super::health_check::{GetSystemHealth, HealthCheckActor, HealthStatus, UpdateHealth};
use crate::config::Config;
use crate::domain::shipment::FulfillmentCoordinator;
use crate::messaging::KafkaNotificationPublisher;
use crate::metrics::Metrics;

// ============================================================================
// Coordinator Actor - Supervises the fulfillment infrastructure
// ============================================================================
//
// Responsibilities:
// - Starts and owns the child actors (DLQ, health check)
// - Spawns the consumer worker pool with restart supervision
// - Periodic system health reporting
// - Graceful shutdown: signals the workers, then stops the children
//
// Actor hierarchy:
//   CoordinatorActor (supervisor)
//   ├── DlqActor
//   ├── HealthCheckActor
//   └── consumer worker tasks (tokio, watch-signalled)
//
// ============================================================================

pub struct CoordinatorActor {
    session: Arc<Session>,
    config: Config,
    fulfillment: Arc<FulfillmentCoordinator>,
    publisher: Arc<KafkaNotificationPublisher>,
    metrics: Arc<Metrics>,
    dlq_actor: Option<Addr<DlqActor>>,
    health_check: Option<Addr<HealthCheckActor>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl CoordinatorActor {
    pub fn new(
        session: Arc<Session>,
        config: Config,
        fulfillment: Arc<FulfillmentCoordinator>,
        publisher: Arc<KafkaNotificationPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            session,
            config,
            fulfillment,
            publisher,
            metrics,
            dlq_actor: None,
            health_check: None,
            shutdown_tx: None,
        }
    }

    fn start_children(&mut self) {
        tracing::info!("Starting supervised children");

        let health_check = HealthCheckActor::new(self.publisher.clone()).start();
        self.health_check = Some(health_check.clone());

        let dlq_actor = DlqActor::new(self.session.clone()).start();
        self.dlq_actor = Some(dlq_actor.clone());
        health_check.do_send(UpdateHealth {
            component: "dlq_actor".to_string(),
            status: HealthStatus::Healthy,
            details: Some("dead letter queue ready".to_string()),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let worker_context = Arc::new(WorkerContext {
            coordinator: self.fulfillment.clone(),
            dead_letters: Arc::new(dlq_actor),
            metrics: self.metrics.clone(),
            retry_policy: self.config.consumer.retry_policy(),
            poll_timeout: self.config.consumer.poll_timeout,
        });

        for worker_id in 0..self.config.consumer.workers {
            let kafka = self.config.kafka.clone();
            let ctx = worker_context.clone();
            let shutdown = shutdown_rx.clone();
            let restart_delay = self.config.consumer.worker_restart_delay;
            let health = health_check.clone();

            actix::spawn(async move {
                health.do_send(UpdateHealth {
                    component: format!("consumer_worker_{}", worker_id),
                    status: HealthStatus::Healthy,
                    details: Some("worker started".to_string()),
                });
                run_supervised(worker_id, kafka, ctx, shutdown, restart_delay).await;
            });
        }

        tracing::info!(
            workers = self.config.consumer.workers,
            "All supervised children started"
        );
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("CoordinatorActor started");
        self.start_children();

        // Periodic health reporting.
        ctx.run_interval(std::time::Duration::from_secs(30), |act, _ctx| {
            if let Some(ref health_check) = act.health_check {
                let health_check = health_check.clone();
                actix::spawn(async move {
                    match health_check.send(GetSystemHealth).await {
                        Ok(health) => match health.overall_status {
                            HealthStatus::Healthy => {
                                tracing::debug!("System health check: healthy");
                            }
                            HealthStatus::Degraded(ref msg) => {
                                tracing::warn!("System health check: degraded - {}", msg);
                            }
                            HealthStatus::Unhealthy(ref msg) => {
                                tracing::error!("System health check: unhealthy - {}", msg);
                            }
                        },
                        Err(e) => {
                            tracing::error!("Failed to get system health: {}", e);
                        }
                    }
                });
            }
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        tracing::info!("CoordinatorActor stopping, initiating graceful shutdown");
        Running::Stop
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<(), String>")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = Result<(), String>;

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) -> Self::Result {
        tracing::info!("Received shutdown signal");

        // Workers drain first so nothing is mid-flight when the DLQ goes away.
        if let Some(ref shutdown_tx) = self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        if let Some(ref dlq_actor) = self.dlq_actor {
            dlq_actor.do_send(StopActor);
        }

        if let Some(ref health_check) = self.health_check {
            health_check.do_send(StopActor);
        }

        ctx.stop();
        Ok(())
    }
}

/// Message to gracefully stop a child actor.
#[derive(Message)]
#[rtype(result = "()")]
struct StopActor;

impl Handler<StopActor> for DlqActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("DlqActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for HealthCheckActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("HealthCheckActor received stop signal");
        ctx.stop();
    }
}

// ============================================================================
// Public API for accessing child actors
// ============================================================================

#[derive(Message)]
#[rtype(result = "Option<Addr<DlqActor>>")]
pub struct GetDlqActor;

impl Handler<GetDlqActor> for CoordinatorActor {
    type Result = Option<Addr<DlqActor>>;

    fn handle(&mut self, _: GetDlqActor, _: &mut Self::Context) -> Self::Result {
        self.dlq_actor.clone()
    }
}
