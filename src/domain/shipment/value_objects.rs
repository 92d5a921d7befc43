use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Shipment Value Objects
// ============================================================================

/// Shipment lifecycle status.
///
/// The forward chain is Created -> Processing -> Shipped -> Delivered.
/// Cancelled is reachable from any non-terminal state. Delivered and
/// Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Created,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Cancelled)
    }

    /// Whether `requested` is directly reachable from `self`.
    ///
    /// Same-state requests are NOT covered here; the entity layer decides
    /// whether they are a no-op or a terminal-state violation.
    pub fn can_transition_to(self, requested: ShipmentStatus) -> bool {
        use ShipmentStatus::*;
        match (self, requested) {
            (Created, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (Created | Processing | Shipped, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Created => "CREATED",
            ShipmentStatus::Processing => "PROCESSING",
            ShipmentStatus::Shipped => "SHIPPED",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ShipmentStatus::Created),
            "PROCESSING" => Ok(ShipmentStatus::Processing),
            "SHIPPED" => Ok(ShipmentStatus::Shipped),
            "DELIVERED" => Ok(ShipmentStatus::Delivered),
            "CANCELLED" => Ok(ShipmentStatus::Cancelled),
            other => Err(format!("unknown shipment status: {}", other)),
        }
    }
}

/// Delivery address snapshot, copied verbatim from the paid-order event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

// ============================================================================
// Unit Tests
// ============================================================================
