use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use scylla::client::session::Session;
use scylla::value::{CqlValue, Row};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::{ShipmentRepository, StorageError};
use crate::domain::shipment::{DeliveryAddress, Shipment, ShipmentStatus};

// ============================================================================
// ScyllaDB Shipment Repository
// ============================================================================
//
// The `shipments` table is keyed by `order_id`, so the idempotent create is
// a single lightweight transaction: INSERT ... IF NOT EXISTS. Two consumers
// racing on a redelivered paid-order event serialize on the LWT; exactly one
// insert is applied.
//
// `amount` is stored as text to keep decimal precision exact; `status` is
// stored as its canonical string form. Secondary indexes back the id, status
// and customer-email lookups.
//
// ============================================================================

const SELECT_COLUMNS: &str = "order_id, id, customer_name, customer_email, street, city, \
     state, zip, country, amount, status, tracking_number, estimated_delivery, \
     created_at, updated_at";

type ShipmentRow = (
    i64,
    Uuid,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<NaiveDate>,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Create the keyspace, tables and indexes this service needs.
/// Called once at startup, before any repository is constructed.
pub async fn init_schema(session: &Session, keyspace: &str) -> anyhow::Result<()> {
    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                keyspace
            ),
            &[],
        )
        .await?;

    session.use_keyspace(keyspace, false).await?;

    session
        .query_unpaged(
            "CREATE TABLE IF NOT EXISTS shipments (
                order_id bigint PRIMARY KEY,
                id uuid,
                customer_name text,
                customer_email text,
                street text,
                city text,
                state text,
                zip text,
                country text,
                amount text,
                status text,
                tracking_number text,
                estimated_delivery date,
                created_at timestamp,
                updated_at timestamp
            )",
            &[],
        )
        .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS shipments_by_id ON shipments (id)",
        "CREATE INDEX IF NOT EXISTS shipments_by_status ON shipments (status)",
        "CREATE INDEX IF NOT EXISTS shipments_by_email ON shipments (customer_email)",
    ] {
        session.query_unpaged(index, &[]).await?;
    }

    session
        .query_unpaged(
            "CREATE TABLE IF NOT EXISTS dead_letter_events (
                id uuid PRIMARY KEY,
                topic text,
                partition int,
                offset bigint,
                payload text,
                error_message text,
                failure_count int,
                first_failed_at timestamp,
                last_failed_at timestamp
            )",
            &[],
        )
        .await?;

    tracing::info!(keyspace, "Shipment schema ready");
    Ok(())
}

pub struct ScyllaShipmentRepository {
    session: Arc<Session>,
}

impl ScyllaShipmentRepository {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn to_row_values(shipment: &Shipment) -> ShipmentRow {
        (
            shipment.order_id,
            shipment.id,
            shipment.customer_name.clone(),
            shipment.customer_email.clone(),
            shipment.address.street.clone(),
            shipment.address.city.clone(),
            shipment.address.state.clone(),
            shipment.address.zip.clone(),
            shipment.address.country.clone(),
            shipment.amount.to_string(),
            shipment.status.to_string(),
            shipment.tracking_number.clone(),
            shipment.estimated_delivery,
            shipment.created_at,
            shipment.updated_at,
        )
    }

    fn from_row(row: ShipmentRow) -> Result<Shipment, StorageError> {
        let (
            order_id,
            id,
            customer_name,
            customer_email,
            street,
            city,
            state,
            zip,
            country,
            amount,
            status,
            tracking_number,
            estimated_delivery,
            created_at,
            updated_at,
        ) = row;

        let amount = Decimal::from_str(&amount)
            .map_err(|e| StorageError::Decode(format!("bad amount for order {}: {}", order_id, e)))?;
        let status = ShipmentStatus::from_str(&status).map_err(StorageError::Decode)?;

        Ok(Shipment {
            id,
            order_id,
            customer_name,
            customer_email,
            address: DeliveryAddress {
                street,
                city,
                state,
                zip,
                country,
            },
            amount,
            status,
            tracking_number,
            estimated_delivery,
            created_at,
            updated_at,
        })
    }

    async fn select_shipments(
        &self,
        query: String,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> Result<Vec<Shipment>, StorageError> {
        let result = self
            .session
            .query_unpaged(query, values)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut shipments = Vec::new();
        for row in rows_result
            .rows::<ShipmentRow>()
            .map_err(|e| StorageError::Decode(e.to_string()))?
        {
            let row = row.map_err(|e| StorageError::Decode(e.to_string()))?;
            shipments.push(Self::from_row(row)?);
        }

        Ok(shipments)
    }

    async fn count_with(
        &self,
        query: &str,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> Result<i64, StorageError> {
        let result = self
            .session
            .query_unpaged(query, values)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match rows_result.maybe_first_row::<(i64,)>() {
            Ok(Some((count,))) => Ok(count),
            Ok(None) => Ok(0),
            Err(e) => Err(StorageError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl ShipmentRepository for ScyllaShipmentRepository {
    async fn create_if_absent(&self, shipment: &Shipment) -> Result<bool, StorageError> {
        let result = self
            .session
            .query_unpaged(
                "INSERT INTO shipments (order_id, id, customer_name, customer_email, street, \
                 city, state, zip, country, amount, status, tracking_number, \
                 estimated_delivery, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                Self::to_row_values(shipment),
            )
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // An LWT response always carries an [applied] boolean as its first
        // column; when the insert lost the race it is false and the row
        // columns of the winner follow.
        let rows_result = result
            .into_rows_result()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let first = rows_result
            .maybe_first_row::<Row>()
            .map_err(|e| StorageError::Decode(e.to_string()))?;

        match first.and_then(|row| row.columns.into_iter().next().flatten()) {
            Some(CqlValue::Boolean(applied)) => Ok(applied),
            _ => Err(StorageError::Decode(
                "conditional insert response missing [applied] column".to_string(),
            )),
        }
    }

    async fn save(&self, shipment: &Shipment) -> Result<(), StorageError> {
        self.session
            .query_unpaged(
                "INSERT INTO shipments (order_id, id, customer_name, customer_email, street, \
                 city, state, zip, country, amount, status, tracking_number, \
                 estimated_delivery, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                Self::to_row_values(shipment),
            )
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Shipment>, StorageError> {
        let mut found = self
            .select_shipments(
                format!("SELECT {} FROM shipments WHERE id = ?", SELECT_COLUMNS),
                (id,),
            )
            .await?;
        Ok(found.pop())
    }

    async fn find_by_order_id(&self, order_id: i64) -> Result<Option<Shipment>, StorageError> {
        let mut found = self
            .select_shipments(
                format!("SELECT {} FROM shipments WHERE order_id = ?", SELECT_COLUMNS),
                (order_id,),
            )
            .await?;
        Ok(found.pop())
    }

    async fn exists_by_order_id(&self, order_id: i64) -> Result<bool, StorageError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT order_id FROM shipments WHERE order_id = ?",
                (order_id,),
            )
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match rows_result.maybe_first_row::<(i64,)>() {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(StorageError::Decode(e.to_string())),
        }
    }

    async fn find_by_status(&self, status: ShipmentStatus) -> Result<Vec<Shipment>, StorageError> {
        self.select_shipments(
            format!("SELECT {} FROM shipments WHERE status = ?", SELECT_COLUMNS),
            (status.to_string(),),
        )
        .await
    }

    async fn find_by_customer_email(&self, email: &str) -> Result<Vec<Shipment>, StorageError> {
        self.select_shipments(
            format!(
                "SELECT {} FROM shipments WHERE customer_email = ?",
                SELECT_COLUMNS
            ),
            (email.to_string(),),
        )
        .await
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StorageError> {
        // The table is keyed by order_id; resolve the surrogate id first.
        let Some(shipment) = self.find_by_id(id).await? else {
            return Ok(false);
        };

        self.session
            .query_unpaged(
                "DELETE FROM shipments WHERE order_id = ?",
                (shipment.order_id,),
            )
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(true)
    }

    async fn count(&self) -> Result<i64, StorageError> {
        self.count_with("SELECT COUNT(*) FROM shipments", &[]).await
    }

    async fn count_by_status(&self, status: ShipmentStatus) -> Result<i64, StorageError> {
        self.count_with(
            "SELECT COUNT(*) FROM shipments WHERE status = ?",
            (status.to_string(),),
        )
        .await
    }
}

// ============================================================================
// Integration Test Notes
// ============================================================================
//
// The repository requires a live ScyllaDB node to exercise:
// - create_if_absent applied/not-applied under concurrent redelivery
// - secondary-index lookups by id, status and customer_email
// - delete_by_id resolving the partition key through the id index
//
// These paths are covered against the in-memory reference implementation in
// storage/memory.rs; the CQL mapping itself needs a containerized node.
//
// ============================================================================
