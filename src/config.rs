use std::str::FromStr;
use std::time::Duration;

use crate::utils::RetryPolicy;

// ============================================================================
// Process Configuration
// ============================================================================
//
// Explicit startup configuration, no ambient statics. Every field has a
// local-development default and can be overridden through FULFILLMENT_*
// environment variables. The dead-letter threshold and retry backoff are
// tunables here, not constants buried in the consumer.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
    pub order_events_topic: String,
    pub notifications_topic: String,
}

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub node: String,
    pub keyspace: String,
}

#[derive(Debug, Clone)]
pub struct ConsumerTuning {
    /// Size of the worker pool. One worker is the reference configuration;
    /// more are safe because order_id uniqueness is enforced in storage.
    pub workers: usize,
    /// Bounded wait for one broker poll.
    pub poll_timeout: Duration,
    /// Delivery attempts per message before it is dead-lettered.
    pub max_delivery_attempts: u32,
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
    /// Pause before a crashed worker is restarted.
    pub worker_restart_delay: Duration,
}

impl ConsumerTuning {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_delivery_attempts,
            initial_delay: self.retry_initial_delay,
            max_delay: self.retry_max_delay,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub scylla: ScyllaConfig,
    pub consumer: ConsumerTuning,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            kafka: KafkaConfig {
                brokers: env_or("FULFILLMENT_BROKERS", "127.0.0.1:9092"),
                consumer_group: env_or("FULFILLMENT_CONSUMER_GROUP", "logistics-fulfillment"),
                order_events_topic: env_or("FULFILLMENT_ORDER_EVENTS_TOPIC", "billing.order.paid"),
                notifications_topic: env_or(
                    "FULFILLMENT_NOTIFICATIONS_TOPIC",
                    "logistics.shipment.notifications",
                ),
            },
            scylla: ScyllaConfig {
                node: env_or("FULFILLMENT_SCYLLA_NODE", "127.0.0.1:9042"),
                keyspace: env_or("FULFILLMENT_KEYSPACE", "logistics_ks"),
            },
            consumer: ConsumerTuning {
                workers: env_parse("FULFILLMENT_WORKERS", 1),
                poll_timeout: Duration::from_millis(env_parse(
                    "FULFILLMENT_POLL_TIMEOUT_MS",
                    1_000,
                )),
                max_delivery_attempts: env_parse("FULFILLMENT_MAX_DELIVERY_ATTEMPTS", 5),
                retry_initial_delay: Duration::from_millis(env_parse(
                    "FULFILLMENT_RETRY_INITIAL_DELAY_MS",
                    100,
                )),
                retry_max_delay: Duration::from_millis(env_parse(
                    "FULFILLMENT_RETRY_MAX_DELAY_MS",
                    10_000,
                )),
                worker_restart_delay: Duration::from_millis(env_parse(
                    "FULFILLMENT_WORKER_RESTART_DELAY_MS",
                    2_000,
                )),
            },
            metrics_port: env_parse("FULFILLMENT_METRICS_PORT", 9090),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw = %raw, "Unparseable configuration value, using default");
            default
        }),
        Err(_) => default,
    }
}
