use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::FulfillmentError;
use super::events::OrderPaid;
use super::value_objects::{DeliveryAddress, ShipmentStatus};

// ============================================================================
// Shipment Entity
// ============================================================================
//
// One shipment per paid order; `order_id` is the unique correlation key and
// the storage layer enforces its uniqueness. Status moves through the graph
// in value_objects.rs; the entity adds the tracking-number precondition and
// timestamp stamping on top of the pure graph.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    // Identity
    pub id: Uuid,
    pub order_id: i64,

    // Customer snapshot from the paid-order event
    pub customer_name: String,
    pub customer_email: String,
    pub address: DeliveryAddress,
    pub amount: Decimal,

    // Lifecycle
    pub status: ShipmentStatus,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<NaiveDate>,

    // Audit trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The shipment was already in the requested state. Redelivered
    /// status-update commands land here instead of failing.
    NoOp,
}

impl Shipment {
    /// Build a fresh shipment in `Created` state from a paid-order event.
    pub fn from_order_paid(event: &OrderPaid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            order_id: event.order_id,
            customer_name: event.customer_name.clone(),
            customer_email: event.customer_email.clone(),
            address: event.address.clone(),
            amount: event.amount,
            status: ShipmentStatus::Created,
            tracking_number: None,
            estimated_delivery: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Request a status transition.
    ///
    /// Terminal states are immutable: even a same-state request fails once a
    /// shipment is DELIVERED or CANCELLED. A same-state request on a
    /// non-terminal shipment is a no-op success. Moving to SHIPPED requires
    /// a tracking number to already be assigned.
    pub fn transition_to(
        &mut self,
        requested: ShipmentStatus,
    ) -> Result<TransitionOutcome, FulfillmentError> {
        if self.status.is_terminal() {
            return Err(FulfillmentError::InvalidTransition {
                from: self.status,
                requested,
            });
        }

        if requested == self.status {
            return Ok(TransitionOutcome::NoOp);
        }

        if !self.status.can_transition_to(requested) {
            return Err(FulfillmentError::InvalidTransition {
                from: self.status,
                requested,
            });
        }

        if requested == ShipmentStatus::Shipped && !self.has_tracking_number() {
            return Err(FulfillmentError::MissingTrackingNumber);
        }

        self.status = requested;
        self.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied)
    }

    /// Assign a carrier tracking number.
    ///
    /// Free-form text; the only rule is non-emptiness. May also record the
    /// carrier's delivery estimate when one is known.
    pub fn assign_tracking(
        &mut self,
        tracking_number: &str,
        estimated_delivery: Option<NaiveDate>,
    ) -> Result<(), FulfillmentError> {
        if tracking_number.trim().is_empty() {
            return Err(FulfillmentError::Validation(
                "tracking number must not be empty".to_string(),
            ));
        }

        self.tracking_number = Some(tracking_number.trim().to_string());
        if estimated_delivery.is_some() {
            self.estimated_delivery = estimated_delivery;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn has_tracking_number(&self) -> bool {
        self.tracking_number
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn paid_order(order_id: i64) -> OrderPaid {
        OrderPaid {
            order_id,
            customer_name: "Grace Hopper".to_string(),
            customer_email: "grace@example.com".to_string(),
            address: DeliveryAddress {
                street: "1 Harbor Way".to_string(),
                city: "Arlington".to_string(),
                state: "VA".to_string(),
                zip: "22201".to_string(),
                country: "US".to_string(),
            },
            amount: Decimal::new(120_50, 2),
            paid_at: Utc::now(),
        }
    }

    fn shipment() -> Shipment {
        Shipment::from_order_paid(&paid_order(42))
    }

    #[test]
    fn test_new_shipment_starts_created() {
        let s = shipment();
        assert_eq!(s.status, ShipmentStatus::Created);
        assert_eq!(s.order_id, 42);
        assert!(s.tracking_number.is_none());
        assert_eq!(s.created_at, s.updated_at);
    }

    #[test]
    fn test_full_forward_lifecycle() {
        let mut s = shipment();

        assert_eq!(
            s.transition_to(ShipmentStatus::Processing).unwrap(),
            TransitionOutcome::Applied
        );
        s.assign_tracking("TRK-0001", None).unwrap();
        assert_eq!(
            s.transition_to(ShipmentStatus::Shipped).unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(
            s.transition_to(ShipmentStatus::Delivered).unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(s.status, ShipmentStatus::Delivered);
    }

    #[test]
    fn test_shipped_requires_tracking_number() {
        let mut s = shipment();
        s.transition_to(ShipmentStatus::Processing).unwrap();

        let err = s.transition_to(ShipmentStatus::Shipped).unwrap_err();
        assert!(matches!(err, FulfillmentError::MissingTrackingNumber));
        // The failed request must not have mutated anything.
        assert_eq!(s.status, ShipmentStatus::Processing);

        s.assign_tracking("TRK-0002", None).unwrap();
        assert!(s.transition_to(ShipmentStatus::Shipped).is_ok());
    }

    #[test]
    fn test_same_state_transition_is_noop() {
        let mut s = shipment();
        s.transition_to(ShipmentStatus::Processing).unwrap();
        let before = s.updated_at;

        assert_eq!(
            s.transition_to(ShipmentStatus::Processing).unwrap(),
            TransitionOutcome::NoOp
        );
        assert_eq!(s.status, ShipmentStatus::Processing);
        assert_eq!(s.updated_at, before);
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut s = shipment();
        s.transition_to(ShipmentStatus::Processing).unwrap();

        let err = s.transition_to(ShipmentStatus::Created).unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InvalidTransition {
                from: ShipmentStatus::Processing,
                requested: ShipmentStatus::Created,
            }
        ));
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut delivered = shipment();
        delivered.transition_to(ShipmentStatus::Processing).unwrap();
        delivered.assign_tracking("TRK-0003", None).unwrap();
        delivered.transition_to(ShipmentStatus::Shipped).unwrap();
        delivered.transition_to(ShipmentStatus::Delivered).unwrap();

        for requested in [
            ShipmentStatus::Created,
            ShipmentStatus::Processing,
            ShipmentStatus::Shipped,
            ShipmentStatus::Delivered,
            ShipmentStatus::Cancelled,
        ] {
            assert!(matches!(
                delivered.transition_to(requested),
                Err(FulfillmentError::InvalidTransition { .. })
            ));
        }

        let mut cancelled = shipment();
        cancelled.transition_to(ShipmentStatus::Cancelled).unwrap();
        assert!(cancelled.transition_to(ShipmentStatus::Processing).is_err());
        assert!(cancelled.transition_to(ShipmentStatus::Cancelled).is_err());
    }

    #[test]
    fn test_cancellation_from_each_non_terminal_state() {
        let mut created = shipment();
        assert!(created.transition_to(ShipmentStatus::Cancelled).is_ok());

        let mut processing = shipment();
        processing.transition_to(ShipmentStatus::Processing).unwrap();
        assert!(processing.transition_to(ShipmentStatus::Cancelled).is_ok());

        let mut shipped = shipment();
        shipped.transition_to(ShipmentStatus::Processing).unwrap();
        shipped.assign_tracking("TRK-0004", None).unwrap();
        shipped.transition_to(ShipmentStatus::Shipped).unwrap();
        assert!(shipped.transition_to(ShipmentStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_assign_tracking_rejects_blank_input() {
        let mut s = shipment();
        assert!(s.assign_tracking("", None).is_err());
        assert!(s.assign_tracking("   ", None).is_err());
        assert!(s.tracking_number.is_none());
    }

    #[test]
    fn test_assign_tracking_trims_and_records_estimate() {
        let mut s = shipment();
        let eta = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();

        s.assign_tracking("  TRK-0005  ", Some(eta)).unwrap();
        assert_eq!(s.tracking_number.as_deref(), Some("TRK-0005"));
        assert_eq!(s.estimated_delivery, Some(eta));

        // Re-assignment without an estimate keeps the recorded one.
        s.assign_tracking("TRK-0006", None).unwrap();
        assert_eq!(s.estimated_delivery, Some(eta));
    }

    #[test]
    fn test_transition_stamps_updated_at() {
        let mut s = shipment();
        let before = s.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        s.transition_to(ShipmentStatus::Processing).unwrap();
        assert!(s.updated_at > before);
    }
}
