use serde::{Deserialize, Serialize};

use crate::domain::shipment::{OrderPaid, OutboundEvent};

// ============================================================================
// Event Envelope - Typed Wire Format
// ============================================================================
//
// Inbound payloads are JSON, adjacently tagged so the event kind is explicit
// on the wire. A payload that does not decode into a known kind is rejected
// here and dead-lettered by the worker; it is never silently dropped.
//
// ============================================================================

/// Union of all event kinds this service consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InboundEvent {
    OrderPaid(OrderPaid),
}

impl InboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            InboundEvent::OrderPaid(_) => "OrderPaid",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("undecodable event payload: {0}")]
    Malformed(String),
}

pub fn decode_inbound(payload: &[u8]) -> Result<InboundEvent, EnvelopeError> {
    serde_json::from_slice(payload).map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

pub fn encode_outbound(event: &OutboundEvent) -> Result<Vec<u8>, EnvelopeError> {
    serde_json::to_vec(event).map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

// ============================================================================
// Unit Tests
// ============================================================================
