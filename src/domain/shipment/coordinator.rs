use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::entity::{Shipment, TransitionOutcome};
use super::errors::FulfillmentError;
use super::events::{OrderPaid, OutboundEvent, ShipmentCreated, ShipmentStatusChanged};
use super::value_objects::ShipmentStatus;
use crate::messaging::NotificationPublisher;
use crate::storage::ShipmentRepository;

// ============================================================================
// Fulfillment Coordinator
// ============================================================================
//
// Drives the consume -> deduplicate -> create/update cycle against the
// storage and publisher ports. The idempotency contract lives here:
//
//   - a paid-order event already reflected by a shipment row is a success,
//     not an error, because the broker delivers at least once;
//   - the final arbiter of uniqueness is the storage layer's atomic
//     check-and-insert, which closes the race between two workers holding
//     redeliveries of the same order.
//
// Status changes and tracking assignment arrive through a separate entry
// point (the REST layer translates HTTP onto these methods) and may be
// reordered relative to creation; an update for an unknown shipment fails
// with NotFound and is the caller's problem to retry.
//
// ============================================================================

/// How a paid-order event was absorbed.
#[derive(Debug, Clone)]
pub enum PaidOrderOutcome {
    Created(Shipment),
    /// Redelivery of an already-processed order; nothing was mutated.
    AlreadyProcessed,
}

pub struct FulfillmentCoordinator {
    repository: Arc<dyn ShipmentRepository>,
    publisher: Arc<dyn NotificationPublisher>,
}

impl FulfillmentCoordinator {
    pub fn new(
        repository: Arc<dyn ShipmentRepository>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Absorb one paid-order event.
    ///
    /// Success means the caller may acknowledge the message; any error means
    /// it must not. Storage failures propagate as transient so the delivery
    /// layer redelivers rather than lose the order.
    pub async fn on_order_paid(
        &self,
        event: &OrderPaid,
    ) -> Result<PaidOrderOutcome, FulfillmentError> {
        event.validate()?;

        if let Some(existing) = self.repository.find_by_order_id(event.order_id).await? {
            tracing::info!(
                order_id = event.order_id,
                shipment_id = %existing.id,
                "Duplicate paid-order event, acknowledging without mutation"
            );
            return Ok(PaidOrderOutcome::AlreadyProcessed);
        }

        let shipment = Shipment::from_order_paid(event);
        if !self.repository.create_if_absent(&shipment).await? {
            // A concurrent worker with a redelivery of this order won the
            // insert between our lookup and now.
            tracing::info!(
                order_id = event.order_id,
                "Lost creation race to a concurrent redelivery, treating as duplicate"
            );
            return Ok(PaidOrderOutcome::AlreadyProcessed);
        }

        tracing::info!(
            order_id = event.order_id,
            shipment_id = %shipment.id,
            customer = %shipment.customer_email,
            "Shipment created for paid order"
        );

        // The write above governs acknowledgment; a redelivery could not
        // re-emit this notice anyway, so a failed handoff is logged and
        // counted rather than turned into a Nack.
        let notice = OutboundEvent::ShipmentCreated(ShipmentCreated {
            shipment_id: shipment.id,
            order_id: shipment.order_id,
            customer_email: shipment.customer_email.clone(),
            amount: shipment.amount,
            paid_at: event.paid_at,
            occurred_at: Utc::now(),
        });
        if let Err(e) = self.publisher.publish(&notice).await {
            tracing::warn!(
                order_id = event.order_id,
                error = %e,
                "Shipment persisted but creation notice was not handed off"
            );
        }

        Ok(PaidOrderOutcome::Created(shipment))
    }

    /// Request a lifecycle transition for a shipment.
    ///
    /// On an applied transition the new state is persisted first, then a
    /// status-changed notification is handed to the broker; a handoff
    /// failure surfaces as `Publish` so the caller can re-drive it. A no-op
    /// (same-state redelivery) neither persists nor notifies.
    pub async fn update_status(
        &self,
        shipment_id: Uuid,
        requested: ShipmentStatus,
    ) -> Result<Shipment, FulfillmentError> {
        let mut shipment = self.require(shipment_id).await?;
        let previous = shipment.status;

        match shipment.transition_to(requested)? {
            TransitionOutcome::NoOp => {
                tracing::debug!(
                    shipment_id = %shipment_id,
                    status = %requested,
                    "Status already current, nothing to do"
                );
                Ok(shipment)
            }
            TransitionOutcome::Applied => {
                self.repository.save(&shipment).await?;

                tracing::info!(
                    shipment_id = %shipment_id,
                    order_id = shipment.order_id,
                    from = %previous,
                    to = %requested,
                    "Shipment status updated"
                );

                let notice = OutboundEvent::ShipmentStatusChanged(ShipmentStatusChanged {
                    shipment_id: shipment.id,
                    order_id: shipment.order_id,
                    previous_status: previous,
                    new_status: shipment.status,
                    tracking_number: shipment.tracking_number.clone(),
                    changed_at: shipment.updated_at,
                    occurred_at: Utc::now(),
                });
                self.publisher
                    .publish(&notice)
                    .await
                    .map_err(|e| FulfillmentError::Publish(e.to_string()))?;

                Ok(shipment)
            }
        }
    }

    /// Attach a carrier tracking number (and optionally a delivery estimate)
    /// to a shipment.
    pub async fn assign_tracking(
        &self,
        shipment_id: Uuid,
        tracking_number: &str,
        estimated_delivery: Option<NaiveDate>,
    ) -> Result<Shipment, FulfillmentError> {
        let mut shipment = self.require(shipment_id).await?;
        shipment.assign_tracking(tracking_number, estimated_delivery)?;
        self.repository.save(&shipment).await?;

        tracing::info!(
            shipment_id = %shipment_id,
            order_id = shipment.order_id,
            tracking_number = %tracking_number.trim(),
            "Tracking number assigned"
        );
        Ok(shipment)
    }

    // ------------------------------------------------------------------
    // Queries - thin pass-throughs for the HTTP layer
    // ------------------------------------------------------------------

    pub async fn get(&self, shipment_id: Uuid) -> Result<Shipment, FulfillmentError> {
        self.require(shipment_id).await
    }

    pub async fn find_by_order(&self, order_id: i64) -> Result<Option<Shipment>, FulfillmentError> {
        Ok(self.repository.find_by_order_id(order_id).await?)
    }

    pub async fn list_by_status(
        &self,
        status: ShipmentStatus,
    ) -> Result<Vec<Shipment>, FulfillmentError> {
        Ok(self.repository.find_by_status(status).await?)
    }

    pub async fn list_for_customer(
        &self,
        email: &str,
    ) -> Result<Vec<Shipment>, FulfillmentError> {
        Ok(self.repository.find_by_customer_email(email).await?)
    }

    pub async fn count(&self) -> Result<i64, FulfillmentError> {
        Ok(self.repository.count().await?)
    }

    pub async fn count_by_status(&self, status: ShipmentStatus) -> Result<i64, FulfillmentError> {
        Ok(self.repository.count_by_status(status).await?)
    }

    /// Administrative removal, outside the normal lifecycle.
    pub async fn delete(&self, shipment_id: Uuid) -> Result<(), FulfillmentError> {
        if !self.repository.delete_by_id(shipment_id).await? {
            return Err(FulfillmentError::NotFound(shipment_id.to_string()));
        }
        tracing::warn!(shipment_id = %shipment_id, "Shipment deleted by administrative request");
        Ok(())
    }

    async fn require(&self, shipment_id: Uuid) -> Result<Shipment, FulfillmentError> {
        self.repository
            .find_by_id(shipment_id)
            .await?
            .ok_or_else(|| FulfillmentError::NotFound(shipment_id.to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
