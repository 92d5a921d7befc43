// ============================================================================
// Shipment Domain - Fulfillment of Paid Orders
// ============================================================================
//
// Everything shipment-specific lives here:
// - Value objects (ShipmentStatus, DeliveryAddress) and the transition graph
// - Entity (Shipment) with the tracking-number policy
// - Events (inbound OrderPaid, outbound notifications)
// - Errors (FulfillmentError)
// - Coordinator (the consume/deduplicate/create/update cycle over the ports)
//
// ============================================================================

pub mod coordinator;
pub mod entity;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use coordinator::{FulfillmentCoordinator, PaidOrderOutcome};
pub use entity::{Shipment, TransitionOutcome};
pub use errors::FulfillmentError;
pub use events::{OrderPaid, OutboundEvent, ShipmentCreated, ShipmentStatusChanged};
pub use value_objects::{DeliveryAddress, ShipmentStatus};
