// ============================================================================
// Messaging - Broker-Facing Infrastructure
// ============================================================================
//
// The typed wire format (envelope), the manually-acknowledged consumer, and
// the outbound notification publisher. Business logic sees only the
// NotificationPublisher port and decoded domain events.
//
// ============================================================================

pub mod consumer;
pub mod envelope;
pub mod producer;

pub use consumer::{InboundMessage, OrderEventSource};
pub use envelope::{decode_inbound, encode_outbound, EnvelopeError, InboundEvent};
pub use producer::{KafkaNotificationPublisher, NotificationPublisher, PublishError};
