use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::FulfillmentError;
use super::value_objects::{DeliveryAddress, ShipmentStatus};

// ============================================================================
// Domain Events
// ============================================================================
//
// Inbound: facts published by the billing side, consumed at least once.
// Outbound: notifications this service emits for downstream consumers.
//
// Outbound events carry TWO timestamps: the business instant the change
// happened, and `occurred_at`, the instant the notification was emitted.
// They are different instants and both are retained on the wire.
//
// ============================================================================

/// Fact that an order has been paid. Immutable; may be redelivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaid {
    pub order_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub address: DeliveryAddress,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

impl OrderPaid {
    /// Payload-level validation, applied before any storage access.
    ///
    /// The broker cannot guarantee well-formed payloads; a message that
    /// decodes but fails these checks is poisoned and belongs in the DLQ.
    pub fn validate(&self) -> Result<(), FulfillmentError> {
        if self.order_id <= 0 {
            return Err(FulfillmentError::Validation(format!(
                "order_id must be positive, got {}",
                self.order_id
            )));
        }
        if self.customer_email.trim().is_empty() {
            return Err(FulfillmentError::Validation(
                "customer_email is empty".to_string(),
            ));
        }
        if self.amount < Decimal::ZERO {
            return Err(FulfillmentError::Validation(format!(
                "amount must not be negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Notification that a shipment record was created for a paid order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentCreated {
    pub shipment_id: Uuid,
    pub order_id: i64,
    pub customer_email: String,
    pub amount: Decimal,
    /// Business instant: when the order was paid.
    pub paid_at: DateTime<Utc>,
    /// Emission instant: when this notification was published.
    pub occurred_at: DateTime<Utc>,
}

/// Notification that a shipment moved to a new lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentStatusChanged {
    pub shipment_id: Uuid,
    pub order_id: i64,
    pub previous_status: ShipmentStatus,
    pub new_status: ShipmentStatus,
    pub tracking_number: Option<String>,
    /// Business instant: when the transition was committed.
    pub changed_at: DateTime<Utc>,
    /// Emission instant: when this notification was published.
    pub occurred_at: DateTime<Utc>,
}

/// Union of all notifications this service publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundEvent {
    ShipmentCreated(ShipmentCreated),
    ShipmentStatusChanged(ShipmentStatusChanged),
}

impl OutboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OutboundEvent::ShipmentCreated(_) => "ShipmentCreated",
            OutboundEvent::ShipmentStatusChanged(_) => "ShipmentStatusChanged",
        }
    }

    /// Partition key: all notifications for one shipment stay ordered.
    pub fn partition_key(&self) -> String {
        match self {
            OutboundEvent::ShipmentCreated(e) => e.shipment_id.to_string(),
            OutboundEvent::ShipmentStatusChanged(e) => e.shipment_id.to_string(),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
