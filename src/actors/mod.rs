// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure: supervision, dead-letter persistence and
// health aggregation. Domain logic lives in src/domain and is driven by the
// consumer worker, NOT implemented as actors.
//
// ============================================================================

mod consumer_worker;
mod coordinator;
mod dlq;
mod health_check;

pub use consumer_worker::{handle_message, Disposition, WorkerContext};
pub use coordinator::{CoordinatorActor, GetDlqActor, Shutdown};
pub use dlq::{DeadLetterSink, DlqActor, GetDeadLetters, GetDlqStats};
pub use health_check::{GetSystemHealth, HealthCheckActor, HealthStatus, SystemHealth};
