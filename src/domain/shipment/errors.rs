use super::value_objects::ShipmentStatus;
use crate::storage::StorageError;
use crate::utils::IsTransient;

// ============================================================================
// Fulfillment Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("malformed order event: {0}")]
    Validation(String),

    #[error("shipment not found: {0}")]
    NotFound(String),

    #[error("invalid status transition from {from} to {requested}")]
    InvalidTransition {
        from: ShipmentStatus,
        requested: ShipmentStatus,
    },

    #[error("a tracking number must be assigned before the shipment can be marked SHIPPED")]
    MissingTrackingNumber,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to hand notification to the broker: {0}")]
    Publish(String),
}

impl IsTransient for FulfillmentError {
    fn is_transient(&self) -> bool {
        match self {
            FulfillmentError::Storage(e) => e.is_transient(),
            FulfillmentError::Publish(_) => true,
            _ => false,
        }
    }
}
