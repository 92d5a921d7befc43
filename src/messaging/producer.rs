use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;

use super::envelope::encode_outbound;
use crate::config::KafkaConfig;
use crate::domain::shipment::OutboundEvent;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

// ============================================================================
// Outbound Notification Publisher
// ============================================================================
//
// Fire-and-forget from the business caller's point of view, but `publish`
// returns Ok only once the broker has confirmed delivery of the record. A
// handoff failure is always surfaced so the triggering operation can decide
// what to compensate; it is never swallowed here.
//
// The Kafka implementation sits behind a circuit breaker so a dead broker
// fails fast instead of stalling every status update for the full timeout.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("notification broker unavailable (circuit open)")]
    CircuitOpen,

    #[error("broker handoff failed: {0}")]
    Handoff(String),

    #[error("could not encode notification: {0}")]
    Encode(String),
}

/// Broker-agnostic publisher port.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError>;
}

pub struct KafkaNotificationPublisher {
    producer: FutureProducer,
    topic: String,
    circuit_breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl KafkaNotificationPublisher {
    pub fn new(kafka: &KafkaConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        tracing::info!(
            brokers = %kafka.brokers,
            topic = %kafka.notifications_topic,
            "Notification publisher ready"
        );

        Ok(Self {
            producer,
            topic: kafka.notifications_topic.clone(),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            metrics,
        })
    }

    pub async fn circuit_state(&self) -> crate::utils::CircuitState {
        self.circuit_breaker.state().await
    }
}

#[async_trait]
impl NotificationPublisher for KafkaNotificationPublisher {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        let payload = encode_outbound(event).map_err(|e| PublishError::Encode(e.to_string()))?;
        let key = event.partition_key();
        let event_type = event.event_type();

        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);
                self.producer
                    .send(record, Duration::from_secs(5))
                    .await
                    .map_err(|(e, _)| e)
            })
            .await;

        self.metrics
            .set_publisher_circuit_state(self.circuit_breaker.state().await.as_gauge());

        match result {
            Ok(_) => {
                self.metrics.record_notification(event_type, true);
                tracing::info!(
                    topic = %self.topic,
                    key = %key,
                    event_type,
                    "Published notification"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                self.metrics.record_notification(event_type, false);
                tracing::error!(
                    topic = %self.topic,
                    event_type,
                    "Circuit breaker open, notification not attempted"
                );
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                self.metrics.record_notification(event_type, false);
                tracing::error!(
                    topic = %self.topic,
                    event_type,
                    error = %e,
                    "Failed to publish notification"
                );
                Err(PublishError::Handoff(e.to_string()))
            }
        }
    }
}
