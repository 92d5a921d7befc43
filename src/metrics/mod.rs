mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub use server::start_metrics_server;

// ============================================================================
// Metrics - Prometheus Observability
// ============================================================================
//
// Counters and histograms for the consume/dedup/persist/ack cycle, the
// dead-letter path and the outbound publisher. Scraped via /metrics on the
// admin HTTP server.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Consumer-side
    pub events_consumed: IntCounterVec,
    pub events_rejected: IntCounterVec,
    pub duplicate_events: IntCounter,
    pub shipments_created: IntCounter,
    pub event_handle_duration: HistogramVec,
    pub dead_letters_total: IntCounter,

    // Publisher-side
    pub notifications_published: IntCounterVec,
    pub notifications_failed: IntCounterVec,
    pub publisher_circuit_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_consumed = IntCounterVec::new(
            Opts::new("fulfillment_events_consumed_total", "Inbound events decoded and dispatched"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let events_rejected = IntCounterVec::new(
            Opts::new(
                "fulfillment_events_rejected_total",
                "Inbound events that left the normal processing path",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(events_rejected.clone()))?;

        let duplicate_events = IntCounter::new(
            "fulfillment_duplicate_events_total",
            "Redelivered paid-order events absorbed as no-ops",
        )?;
        registry.register(Box::new(duplicate_events.clone()))?;

        let shipments_created = IntCounter::new(
            "fulfillment_shipments_created_total",
            "Shipments created from paid-order events",
        )?;
        registry.register(Box::new(shipments_created.clone()))?;

        let event_handle_duration = HistogramVec::new(
            HistogramOpts::new(
                "fulfillment_event_handle_duration_seconds",
                "Time from message receipt to durable outcome",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(event_handle_duration.clone()))?;

        let dead_letters_total = IntCounter::new(
            "fulfillment_dead_letters_total",
            "Messages routed to the dead-letter table",
        )?;
        registry.register(Box::new(dead_letters_total.clone()))?;

        let notifications_published = IntCounterVec::new(
            Opts::new(
                "fulfillment_notifications_published_total",
                "Outbound notifications confirmed by the broker",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(notifications_published.clone()))?;

        let notifications_failed = IntCounterVec::new(
            Opts::new(
                "fulfillment_notifications_failed_total",
                "Outbound notifications that failed handoff",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(notifications_failed.clone()))?;

        let publisher_circuit_state = IntGauge::new(
            "fulfillment_publisher_circuit_state",
            "Publisher circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(publisher_circuit_state.clone()))?;

        Ok(Self {
            registry,
            events_consumed,
            events_rejected,
            duplicate_events,
            shipments_created,
            event_handle_duration,
            dead_letters_total,
            notifications_published,
            notifications_failed,
            publisher_circuit_state,
        })
    }

    /// Registry handle for the HTTP exposition endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_consumed(&self, event_type: &str) {
        self.events_consumed.with_label_values(&[event_type]).inc();
    }

    pub fn record_rejected(&self, reason: &str) {
        self.events_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_duplicate(&self) {
        self.duplicate_events.inc();
    }

    pub fn record_shipment_created(&self) {
        self.shipments_created.inc();
    }

    pub fn observe_handle_duration(&self, event_type: &str, seconds: f64) {
        self.event_handle_duration
            .with_label_values(&[event_type])
            .observe(seconds);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters_total.inc();
    }

    pub fn record_notification(&self, event_type: &str, success: bool) {
        if success {
            self.notifications_published
                .with_label_values(&[event_type])
                .inc();
        } else {
            self.notifications_failed
                .with_label_values(&[event_type])
                .inc();
        }
    }

    pub fn set_publisher_circuit_state(&self, state: i64) {
        self.publisher_circuit_state.set(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_cleanly() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_consume_and_duplicate_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_consumed("OrderPaid");
        metrics.record_consumed("OrderPaid");
        metrics.record_duplicate();

        let gathered = metrics.registry.gather();
        let consumed = gathered
            .iter()
            .find(|m| m.name() == "fulfillment_events_consumed_total")
            .unwrap();
        assert_eq!(consumed.metric[0].counter.value, Some(2.0));

        let duplicates = gathered
            .iter()
            .find(|m| m.name() == "fulfillment_duplicate_events_total")
            .unwrap();
        assert_eq!(duplicates.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_rejection_reasons_are_labelled() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejected("malformed");
        metrics.record_rejected("retries_exhausted");
        metrics.record_rejected("malformed");

        let gathered = metrics.registry.gather();
        let rejected = gathered
            .iter()
            .find(|m| m.name() == "fulfillment_events_rejected_total")
            .unwrap();
        assert_eq!(rejected.metric.len(), 2);
    }

    #[test]
    fn test_notification_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_notification("ShipmentCreated", true);
        metrics.record_notification("ShipmentStatusChanged", false);
        metrics.set_publisher_circuit_state(1);

        let gathered = metrics.registry.gather();
        assert!(gathered
            .iter()
            .any(|m| m.name() == "fulfillment_notifications_published_total"));
        let state = gathered
            .iter()
            .find(|m| m.name() == "fulfillment_publisher_circuit_state")
            .unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
