use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ShipmentRepository, StorageError};
use crate::domain::shipment::{Shipment, ShipmentStatus};

// ============================================================================
// In-Memory Shipment Repository
// ============================================================================
//
// Reference implementation of the storage port. The map is keyed by
// `order_id`, so `create_if_absent` gets the same check-and-insert atomicity
// the ScyllaDB LWT provides: the entry check and the insert happen under one
// lock acquisition.
//
// Used by unit tests across the crate; also handy for local smoke runs.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryShipmentRepository {
    rows: Mutex<HashMap<i64, Shipment>>,
}

impl InMemoryShipmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShipmentRepository for InMemoryShipmentRepository {
    async fn create_if_absent(&self, shipment: &Shipment) -> Result<bool, StorageError> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&shipment.order_id) {
            return Ok(false);
        }
        rows.insert(shipment.order_id, shipment.clone());
        Ok(true)
    }

    async fn save(&self, shipment: &Shipment) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        rows.insert(shipment.order_id, shipment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Shipment>, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows.values().find(|s| s.id == id).cloned())
    }

    async fn find_by_order_id(&self, order_id: i64) -> Result<Option<Shipment>, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows.get(&order_id).cloned())
    }

    async fn exists_by_order_id(&self, order_id: i64) -> Result<bool, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows.contains_key(&order_id))
    }

    async fn find_by_status(&self, status: ShipmentStatus) -> Result<Vec<Shipment>, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows.values().filter(|s| s.status == status).cloned().collect())
    }

    async fn find_by_customer_email(&self, email: &str) -> Result<Vec<Shipment>, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|s| s.customer_email == email)
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut rows = self.rows.lock().await;
        let order_id = rows.values().find(|s| s.id == id).map(|s| s.order_id);
        match order_id {
            Some(order_id) => {
                rows.remove(&order_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<i64, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows.len() as i64)
    }

    async fn count_by_status(&self, status: ShipmentStatus) -> Result<i64, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows.values().filter(|s| s.status == status).count() as i64)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shipment::{DeliveryAddress, OrderPaid};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn shipment_for_order(order_id: i64) -> Shipment {
        Shipment::from_order_paid(&OrderPaid {
            order_id,
            customer_name: "Testy".to_string(),
            customer_email: "testy@example.com".to_string(),
            address: DeliveryAddress {
                street: "1 Main".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip: "62701".to_string(),
                country: "US".to_string(),
            },
            amount: Decimal::new(10_00, 2),
            paid_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_create_if_absent_inserts_once() {
        let repo = InMemoryShipmentRepository::new();
        let shipment = shipment_for_order(1);

        assert!(repo.create_if_absent(&shipment).await.unwrap());
        assert!(!repo.create_if_absent(&shipment).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_id_and_order_id() {
        let repo = InMemoryShipmentRepository::new();
        let shipment = shipment_for_order(7);
        repo.create_if_absent(&shipment).await.unwrap();

        let by_order = repo.find_by_order_id(7).await.unwrap().unwrap();
        assert_eq!(by_order.id, shipment.id);

        let by_id = repo.find_by_id(shipment.id).await.unwrap().unwrap();
        assert_eq!(by_id.order_id, 7);

        assert!(repo.exists_by_order_id(7).await.unwrap());
        assert!(!repo.exists_by_order_id(8).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_and_email_queries() {
        let repo = InMemoryShipmentRepository::new();
        for order_id in 1..=3 {
            repo.create_if_absent(&shipment_for_order(order_id))
                .await
                .unwrap();
        }

        let mut second = repo.find_by_order_id(2).await.unwrap().unwrap();
        second.transition_to(ShipmentStatus::Processing).unwrap();
        repo.save(&second).await.unwrap();

        let created = repo.find_by_status(ShipmentStatus::Created).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(
            repo.count_by_status(ShipmentStatus::Processing).await.unwrap(),
            1
        );

        let mine = repo
            .find_by_customer_email("testy@example.com")
            .await
            .unwrap();
        assert_eq!(mine.len(), 3);
        assert!(repo
            .find_by_customer_email("nobody@example.com")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let repo = InMemoryShipmentRepository::new();
        let shipment = shipment_for_order(5);
        repo.create_if_absent(&shipment).await.unwrap();

        assert!(repo.delete_by_id(shipment.id).await.unwrap());
        assert!(!repo.delete_by_id(shipment.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
