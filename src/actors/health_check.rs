use actix::prelude::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::messaging::KafkaNotificationPublisher;
use crate::utils::CircuitState;

// ============================================================================
// Health Check Actor - Monitors system health
// ============================================================================
//
// Tracks per-component health (consumer workers, DLQ, publisher circuit)
// and aggregates it into one system-wide status. The publisher circuit is
// probed on an interval; the other components push their own updates.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

// ============================================================================
// Health Check Actor
// ============================================================================

pub struct HealthCheckActor {
    components: HashMap<String, ComponentHealth>,
    publisher: Arc<KafkaNotificationPublisher>,
}

impl HealthCheckActor {
    pub fn new(publisher: Arc<KafkaNotificationPublisher>) -> Self {
        Self {
            components: HashMap::new(),
            publisher,
        }
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{}: {}", name, msg)),
                HealthStatus::Degraded(_) => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy.is_empty() {
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthCheckActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthCheckActor started");

        let addr = ctx.address();

        // Probe the publisher circuit on an interval; its state is the best
        // signal we have for broker reachability on the outbound side.
        ctx.run_interval(std::time::Duration::from_secs(10), move |act, _ctx| {
            let publisher = act.publisher.clone();
            let addr = addr.clone();

            actix::spawn(async move {
                let status = match publisher.circuit_state().await {
                    CircuitState::Closed => HealthStatus::Healthy,
                    CircuitState::HalfOpen => {
                        HealthStatus::Degraded("publisher circuit half-open".to_string())
                    }
                    CircuitState::Open => {
                        HealthStatus::Unhealthy("publisher circuit open".to_string())
                    }
                };

                addr.do_send(UpdateHealth {
                    component: "notification_publisher".to_string(),
                    status,
                    details: None,
                });
            });
        });
    }
}

impl Handler<UpdateHealth> for HealthCheckActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _: &mut Self::Context) {
        let health = ComponentHealth {
            name: msg.component.clone(),
            status: msg.status.clone(),
            last_check: Utc::now(),
            details: msg.details,
        };

        tracing::debug!(
            component = %msg.component,
            status = ?msg.status,
            "Updated component health"
        );

        self.components.insert(msg.component, health);
    }
}

impl Handler<GetSystemHealth> for HealthCheckActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
