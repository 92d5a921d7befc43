use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;

use crate::config::KafkaConfig;

// ============================================================================
// Order Event Source - Broker Consumer with Manual Acknowledgment
// ============================================================================
//
// Wraps the Kafka stream consumer with auto-commit DISABLED. The consumer
// position advances only through `ack`, which the worker calls after the
// durable write. A crash between write and ack therefore redelivers the
// message, and the idempotent create absorbs the duplicate.
//
// ============================================================================

/// Owned snapshot of one delivered message.
///
/// Decoupled from the broker client's borrowed message so it can cross await
/// points and be replayed against the DLQ on failure.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

pub struct OrderEventSource {
    consumer: StreamConsumer,
}

impl OrderEventSource {
    /// Create a consumer in the configured group and subscribe to the
    /// paid-order topic.
    pub fn new(kafka: &KafkaConfig) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.brokers)
            .set("group.id", &kafka.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        consumer.subscribe(&[&kafka.order_events_topic])?;

        tracing::info!(
            brokers = %kafka.brokers,
            group = %kafka.consumer_group,
            topic = %kafka.order_events_topic,
            "Order event source subscribed"
        );

        Ok(Self { consumer })
    }

    /// Wait up to `timeout` for the next message. `None` means the wait
    /// expired; the caller loops and re-checks its shutdown signal.
    pub async fn poll(&self, timeout: Duration) -> anyhow::Result<Option<InboundMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(anyhow::anyhow!("broker poll failed: {}", e)),
            Ok(Ok(message)) => {
                let inbound = InboundMessage {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    key: message
                        .key()
                        .and_then(|k| std::str::from_utf8(k).ok())
                        .map(String::from),
                    payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
                };

                tracing::debug!(
                    topic = %inbound.topic,
                    partition = inbound.partition,
                    offset = inbound.offset,
                    key = ?inbound.key,
                    "Received inbound message"
                );

                Ok(Some(inbound))
            }
        }
    }

    /// Acknowledge `msg`: commit the next offset for its partition.
    ///
    /// Must only be called after the message's effects are durable.
    pub fn ack(&self, msg: &InboundMessage) -> anyhow::Result<()> {
        let mut positions = TopicPartitionList::new();
        positions.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))?;

        self.consumer
            .commit(&positions, rdkafka::consumer::CommitMode::Async)?;

        tracing::debug!(
            topic = %msg.topic,
            partition = msg.partition,
            committed = msg.offset + 1,
            "Acknowledged message"
        );
        Ok(())
    }
}
