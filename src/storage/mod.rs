use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::shipment::{Shipment, ShipmentStatus};
use crate::utils::IsTransient;

// ============================================================================
// Shipment Storage Port
// ============================================================================
//
// The coordinator depends only on this trait, never on a storage engine.
// The uniqueness of `order_id` is enforced HERE, atomically, so that two
// workers racing on a redelivered event cannot both insert a row.
//
// ============================================================================

mod memory;
mod scylla_store;

pub use memory::InMemoryShipmentRepository;
pub use scylla_store::{init_schema, ScyllaShipmentRepository};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend refused or failed the operation; retryable.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored row could not be decoded; retrying will not help.
    #[error("corrupt stored row: {0}")]
    Decode(String),
}

impl IsTransient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}

#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    /// Atomic check-and-insert keyed by `order_id`.
    ///
    /// Returns `true` if the shipment was inserted, `false` if a shipment
    /// for the same order already existed. This is the idempotency primitive
    /// the consumer relies on under at-least-once delivery.
    async fn create_if_absent(&self, shipment: &Shipment) -> Result<bool, StorageError>;

    /// Upsert the full row. Used for status and tracking updates.
    async fn save(&self, shipment: &Shipment) -> Result<(), StorageError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Shipment>, StorageError>;

    async fn find_by_order_id(&self, order_id: i64) -> Result<Option<Shipment>, StorageError>;

    async fn exists_by_order_id(&self, order_id: i64) -> Result<bool, StorageError>;

    async fn find_by_status(&self, status: ShipmentStatus) -> Result<Vec<Shipment>, StorageError>;

    async fn find_by_customer_email(&self, email: &str) -> Result<Vec<Shipment>, StorageError>;

    /// Administrative removal. Returns `true` if a row was deleted.
    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StorageError>;

    async fn count(&self) -> Result<i64, StorageError>;

    async fn count_by_status(&self, status: ShipmentStatus) -> Result<i64, StorageError>;
}
