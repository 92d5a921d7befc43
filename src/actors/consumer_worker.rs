use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::dlq::{DeadLetterEntry, DeadLetterSink};
use crate::config::KafkaConfig;
use crate::domain::shipment::{FulfillmentCoordinator, PaidOrderOutcome};
use crate::messaging::{decode_inbound, InboundEvent, InboundMessage, OrderEventSource};
use crate::metrics::Metrics;
use crate::utils::{retry, RetryOutcome, RetryPolicy};

// ============================================================================
// Consumer Worker - the consume -> deduplicate -> persist -> ack loop
// ============================================================================
//
// One worker owns one broker consumer. Each message is processed to a
// durable outcome before its offset is committed:
//
//   decoded + persisted            -> ack
//   duplicate redelivery           -> ack (no mutation)
//   undecodable / rule violation   -> dead-letter, then ack
//   transient failure              -> bounded retry; budget spent -> DLQ
//   dead-letter write failed       -> halt WITHOUT ack; the supervisor
//                                     restarts the worker and the broker
//                                     redelivers from the last commit
//
// Commit ordering is the load-bearing property here: the offset only moves
// after a durable write, and redelivery after a crash is absorbed by the
// idempotent create.
//
// ============================================================================

pub struct WorkerContext {
    pub coordinator: Arc<FulfillmentCoordinator>,
    pub dead_letters: Arc<dyn DeadLetterSink>,
    pub metrics: Arc<Metrics>,
    pub retry_policy: RetryPolicy,
    pub poll_timeout: Duration,
}

/// What to do with the message once processing settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Effects are durable; commit the offset.
    Ack,
    /// Message was routed to the DLQ; commit so the partition moves on.
    DeadLettered,
    /// Nothing durable happened and the DLQ is unreachable; do not commit.
    Halt,
}

/// Process one inbound message to a settled disposition.
///
/// Free function rather than a method so tests can drive it directly with
/// in-memory ports and no broker.
pub async fn handle_message(ctx: &WorkerContext, msg: &InboundMessage) -> Disposition {
    let started = Instant::now();

    let event = match decode_inbound(&msg.payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "Undecodable payload, dead-lettering"
            );
            ctx.metrics.record_rejected("malformed");
            return dead_letter(ctx, msg, e.to_string(), 1).await;
        }
    };

    let event_type = event.event_type();
    ctx.metrics.record_consumed(event_type);

    let disposition = match &event {
        InboundEvent::OrderPaid(order_paid) => {
            let outcome = retry(&ctx.retry_policy, "on_order_paid", |_attempt| {
                let coordinator = ctx.coordinator.clone();
                let event = order_paid.clone();
                async move { coordinator.on_order_paid(&event).await }
            })
            .await;

            match outcome {
                RetryOutcome::Ok(PaidOrderOutcome::Created(shipment)) => {
                    ctx.metrics.record_shipment_created();
                    tracing::debug!(
                        order_id = order_paid.order_id,
                        shipment_id = %shipment.id,
                        offset = msg.offset,
                        "Paid order settled into a new shipment"
                    );
                    Disposition::Ack
                }
                RetryOutcome::Ok(PaidOrderOutcome::AlreadyProcessed) => {
                    ctx.metrics.record_duplicate();
                    Disposition::Ack
                }
                RetryOutcome::Aborted(e) => {
                    tracing::warn!(
                        order_id = order_paid.order_id,
                        error = %e,
                        "Event rejected by business rules, dead-lettering"
                    );
                    ctx.metrics.record_rejected("invalid");
                    dead_letter(ctx, msg, e.to_string(), 1).await
                }
                RetryOutcome::Exhausted(e) => {
                    tracing::error!(
                        order_id = order_paid.order_id,
                        error = %e,
                        "Delivery attempts exhausted, dead-lettering"
                    );
                    ctx.metrics.record_rejected("retries_exhausted");
                    dead_letter(
                        ctx,
                        msg,
                        e.to_string(),
                        ctx.retry_policy.max_attempts as i32,
                    )
                    .await
                }
            }
        }
    };

    ctx.metrics
        .observe_handle_duration(event_type, started.elapsed().as_secs_f64());
    disposition
}

async fn dead_letter(
    ctx: &WorkerContext,
    msg: &InboundMessage,
    error_message: String,
    failure_count: i32,
) -> Disposition {
    let entry = DeadLetterEntry {
        topic: msg.topic.clone(),
        partition: msg.partition,
        offset: msg.offset,
        payload: String::from_utf8_lossy(&msg.payload).into_owned(),
        error_message,
        failure_count,
        first_failed_at: Utc::now(),
    };

    match ctx.dead_letters.record(entry).await {
        Ok(()) => {
            ctx.metrics.record_dead_letter();
            Disposition::DeadLettered
        }
        Err(e) => {
            tracing::error!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "Dead-letter path unavailable, halting so the broker redelivers"
            );
            Disposition::Halt
        }
    }
}

/// Poll/handle/ack until shutdown. Returns Err when the worker can no longer
/// make progress and needs a restart (which also rewinds it to the last
/// committed offset).
pub async fn run_worker(
    worker_id: usize,
    source: OrderEventSource,
    ctx: Arc<WorkerContext>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    tracing::info!(worker_id, "Consumer worker started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!(worker_id, "Consumer worker shutting down");
                    return Ok(());
                }
            }

            polled = source.poll(ctx.poll_timeout) => {
                let msg = match polled {
                    Ok(Some(msg)) => msg,
                    Ok(None) => continue,
                    Err(e) => anyhow::bail!("worker {}: broker poll failed: {}", worker_id, e),
                };

                match handle_message(&ctx, &msg).await {
                    Disposition::Ack | Disposition::DeadLettered => {
                        source.ack(&msg)?;
                    }
                    Disposition::Halt => anyhow::bail!(
                        "worker {}: halted on {}[{}]@{}",
                        worker_id,
                        msg.topic,
                        msg.partition,
                        msg.offset
                    ),
                }
            }
        }
    }
}

/// Keep a worker alive until shutdown, rebuilding its consumer after a
/// failure. Restart resumes from the last committed offset, so anything
/// processed-but-unacknowledged comes back as a redelivery.
pub async fn run_supervised(
    worker_id: usize,
    kafka: KafkaConfig,
    ctx: Arc<WorkerContext>,
    shutdown: watch::Receiver<bool>,
    restart_delay: Duration,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let source = match OrderEventSource::new(&kafka) {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Could not create consumer, retrying");
                tokio::time::sleep(restart_delay).await;
                continue;
            }
        };

        match run_worker(worker_id, source, ctx.clone(), shutdown.clone()).await {
            Ok(()) => break,
            Err(e) => {
                tracing::error!(
                    worker_id,
                    error = %e,
                    "Consumer worker failed, restarting after delay"
                );
                tokio::time::sleep(restart_delay).await;
            }
        }
    }

    tracing::info!(worker_id, "Consumer worker supervision ended");
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shipment::{
        DeliveryAddress, OrderPaid, OutboundEvent, ShipmentStatus,
    };
    use crate::messaging::{NotificationPublisher, PublishError};
    use crate::storage::{InMemoryShipmentRepository, ShipmentRepository, StorageError};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct NullPublisher;

    #[async_trait]
    impl NotificationPublisher for NullPublisher {
        async fn publish(&self, _event: &OutboundEvent) -> Result<(), PublishError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        entries: Mutex<Vec<DeadLetterEntry>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl DeadLetterSink for MemorySink {
        async fn record(&self, entry: DeadLetterEntry) -> Result<(), String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("dlq table unavailable".to_string());
            }
            self.entries.lock().await.push(entry);
            Ok(())
        }
    }

    /// Repository whose create path fails transiently N times before
    /// delegating to the in-memory reference implementation.
    struct FlakyRepository {
        inner: InMemoryShipmentRepository,
        create_failures_left: AtomicU32,
    }

    impl FlakyRepository {
        fn failing(times: u32) -> Self {
            Self {
                inner: InMemoryShipmentRepository::new(),
                create_failures_left: AtomicU32::new(times),
            }
        }
    }

    #[async_trait]
    impl ShipmentRepository for FlakyRepository {
        async fn create_if_absent(
            &self,
            shipment: &crate::domain::shipment::Shipment,
        ) -> Result<bool, StorageError> {
            if self
                .create_failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorageError::Backend("simulated write timeout".to_string()));
            }
            self.inner.create_if_absent(shipment).await
        }

        async fn save(
            &self,
            shipment: &crate::domain::shipment::Shipment,
        ) -> Result<(), StorageError> {
            self.inner.save(shipment).await
        }

        async fn find_by_id(
            &self,
            id: Uuid,
        ) -> Result<Option<crate::domain::shipment::Shipment>, StorageError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_order_id(
            &self,
            order_id: i64,
        ) -> Result<Option<crate::domain::shipment::Shipment>, StorageError> {
            self.inner.find_by_order_id(order_id).await
        }

        async fn exists_by_order_id(&self, order_id: i64) -> Result<bool, StorageError> {
            self.inner.exists_by_order_id(order_id).await
        }

        async fn find_by_status(
            &self,
            status: ShipmentStatus,
        ) -> Result<Vec<crate::domain::shipment::Shipment>, StorageError> {
            self.inner.find_by_status(status).await
        }

        async fn find_by_customer_email(
            &self,
            email: &str,
        ) -> Result<Vec<crate::domain::shipment::Shipment>, StorageError> {
            self.inner.find_by_customer_email(email).await
        }

        async fn delete_by_id(&self, id: Uuid) -> Result<bool, StorageError> {
            self.inner.delete_by_id(id).await
        }

        async fn count(&self) -> Result<i64, StorageError> {
            self.inner.count().await
        }

        async fn count_by_status(&self, status: ShipmentStatus) -> Result<i64, StorageError> {
            self.inner.count_by_status(status).await
        }
    }

    fn paid_order(order_id: i64) -> OrderPaid {
        OrderPaid {
            order_id,
            customer_name: "Ada Lovelace".to_string(),
            customer_email: "ada@example.com".to_string(),
            address: DeliveryAddress {
                street: "12 Analytical Row".to_string(),
                city: "London".to_string(),
                state: "LDN".to_string(),
                zip: "EC1".to_string(),
                country: "UK".to_string(),
            },
            amount: Decimal::new(19_99, 2),
            paid_at: Utc::now(),
        }
    }

    fn message_with(payload: Vec<u8>, offset: i64) -> InboundMessage {
        InboundMessage {
            topic: "billing.order.paid".to_string(),
            partition: 0,
            offset,
            key: None,
            payload,
        }
    }

    fn order_paid_message(order_id: i64, offset: i64) -> InboundMessage {
        let payload =
            serde_json::to_vec(&InboundEvent::OrderPaid(paid_order(order_id))).unwrap();
        message_with(payload, offset)
    }

    fn context_with(
        repository: Arc<dyn ShipmentRepository>,
        sink: Arc<MemorySink>,
    ) -> WorkerContext {
        WorkerContext {
            coordinator: Arc::new(FulfillmentCoordinator::new(
                repository,
                Arc::new(NullPublisher),
            )),
            dead_letters: sink,
            metrics: Arc::new(Metrics::new().unwrap()),
            retry_policy: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
            },
            poll_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_valid_event_is_acked_after_persistence() {
        let repository = Arc::new(InMemoryShipmentRepository::new());
        let ctx = context_with(repository.clone(), Arc::new(MemorySink::default()));

        let disposition = handle_message(&ctx, &order_paid_message(42, 0)).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(repository.exists_by_order_id(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_redelivery_after_crash_before_ack_is_idempotent() {
        let repository = Arc::new(InMemoryShipmentRepository::new());
        let ctx = context_with(repository.clone(), Arc::new(MemorySink::default()));
        let msg = order_paid_message(42, 7);

        // First delivery persists the shipment; the process "crashes" before
        // committing offset 8, so the broker hands the message out again.
        assert_eq!(handle_message(&ctx, &msg).await, Disposition::Ack);
        let original = repository.find_by_order_id(42).await.unwrap().unwrap();

        assert_eq!(handle_message(&ctx, &msg).await, Disposition::Ack);

        assert_eq!(repository.count().await.unwrap(), 1);
        let after = repository.find_by_order_id(42).await.unwrap().unwrap();
        assert_eq!(after.id, original.id);
        assert_eq!(after.status, original.status);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dead_lettered_and_acked() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context_with(Arc::new(InMemoryShipmentRepository::new()), sink.clone());

        let disposition =
            handle_message(&ctx, &message_with(b"{\"type\":\"Garbage\"}".to_vec(), 3)).await;

        assert_eq!(disposition, Disposition::DeadLettered);
        let entries = sink.entries.lock().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 3);
        assert_eq!(entries[0].failure_count, 1);
    }

    #[tokio::test]
    async fn test_rule_violation_is_dead_lettered_not_retried() {
        let sink = Arc::new(MemorySink::default());
        let repository = Arc::new(InMemoryShipmentRepository::new());
        let ctx = context_with(repository.clone(), sink.clone());

        let bad = paid_order(0); // non-positive order id
        let payload = serde_json::to_vec(&InboundEvent::OrderPaid(bad)).unwrap();

        let disposition = handle_message(&ctx, &message_with(payload, 5)).await;

        assert_eq!(disposition, Disposition::DeadLettered);
        assert_eq!(repository.count().await.unwrap(), 0);
        assert_eq!(sink.entries.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_storage_failure_is_retried_to_success() {
        let repository = Arc::new(FlakyRepository::failing(2));
        let ctx = context_with(repository.clone(), Arc::new(MemorySink::default()));

        let disposition = handle_message(&ctx, &order_paid_message(42, 0)).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(repository.exists_by_order_id(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_exhausted_retries_route_to_dead_letter_queue() {
        // More failures than the 3-attempt budget.
        let repository = Arc::new(FlakyRepository::failing(10));
        let sink = Arc::new(MemorySink::default());
        let ctx = context_with(repository.clone(), sink.clone());

        let disposition = handle_message(&ctx, &order_paid_message(42, 0)).await;

        assert_eq!(disposition, Disposition::DeadLettered);
        assert!(!repository.exists_by_order_id(42).await.unwrap());
        let entries = sink.entries.lock().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].failure_count, 3);
    }

    #[tokio::test]
    async fn test_unreachable_dlq_halts_without_ack() {
        let sink = Arc::new(MemorySink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let ctx = context_with(Arc::new(InMemoryShipmentRepository::new()), sink);

        let disposition = handle_message(&ctx, &message_with(b"not json".to_vec(), 9)).await;

        assert_eq!(disposition, Disposition::Halt);
    }

    #[tokio::test]
    async fn test_poisoned_message_does_not_stop_the_worker() {
        let repository = Arc::new(InMemoryShipmentRepository::new());
        let sink = Arc::new(MemorySink::default());
        let ctx = context_with(repository.clone(), sink.clone());

        // A poisoned message followed by a healthy one, as the worker loop
        // would see them.
        let bad = message_with(b"\xff\xfe".to_vec(), 1);
        let good = order_paid_message(43, 2);

        assert_eq!(handle_message(&ctx, &bad).await, Disposition::DeadLettered);
        assert_eq!(handle_message(&ctx, &good).await, Disposition::Ack);

        assert!(repository.exists_by_order_id(43).await.unwrap());
        assert_eq!(sink.entries.lock().await.len(), 1);
    }
}
