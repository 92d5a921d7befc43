use actix::prelude::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Terminal sink for messages that cannot be processed: undecodable payloads
// and events whose retry budget is spent. A dead-lettered message leaves the
// redelivery path; the row keeps everything needed for manual replay.
//
// ============================================================================

/// What the worker knows about a failed message.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
}

/// Sink port so the worker can be tested without a database.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, entry: DeadLetterEntry) -> Result<(), String>;
}

pub struct DlqActor {
    session: Arc<Session>,
}

impl DlqActor {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Actor for DlqActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("DlqActor started - dead letter queue ready");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), String>")]
pub struct AddToDlq(pub DeadLetterEntry);

#[derive(Message)]
#[rtype(result = "Result<Vec<DeadLetterRecord>, String>")]
pub struct GetDeadLetters {
    pub limit: i32,
}

#[derive(Message)]
#[rtype(result = "Result<DlqStats, String>")]
pub struct GetDlqStats;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DlqStats {
    pub total_messages: i64,
}

// ============================================================================
// Handlers
// ============================================================================

impl Handler<AddToDlq> for DlqActor {
    type Result = ResponseFuture<Result<(), String>>;

    fn handle(&mut self, msg: AddToDlq, _: &mut Self::Context) -> Self::Result {
        let session = self.session.clone();
        let entry = msg.0;
        let id = Uuid::new_v4();
        let now = Utc::now();

        tracing::error!(
            dead_letter_id = %id,
            topic = %entry.topic,
            partition = entry.partition,
            offset = entry.offset,
            error = %entry.error_message,
            failure_count = entry.failure_count,
            "Routing message to dead letter queue"
        );

        Box::pin(async move {
            session
                .query_unpaged(
                    "INSERT INTO dead_letter_events (
                        id, topic, partition, offset, payload,
                        error_message, failure_count, first_failed_at, last_failed_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    (
                        id,
                        &entry.topic,
                        entry.partition,
                        entry.offset,
                        &entry.payload,
                        &entry.error_message,
                        entry.failure_count,
                        entry.first_failed_at,
                        now,
                    ),
                )
                .await
                .map_err(|e| format!("failed to insert dead letter: {}", e))?;

            tracing::info!(dead_letter_id = %id, "Message stored in dead letter queue");
            Ok(())
        })
    }
}

impl Handler<GetDeadLetters> for DlqActor {
    type Result = ResponseFuture<Result<Vec<DeadLetterRecord>, String>>;

    fn handle(&mut self, msg: GetDeadLetters, _: &mut Self::Context) -> Self::Result {
        let session = self.session.clone();

        Box::pin(async move {
            let result = session
                .query_unpaged(
                    "SELECT id, topic, partition, offset, payload, error_message,
                            failure_count, first_failed_at, last_failed_at
                     FROM dead_letter_events
                     LIMIT ?",
                    (msg.limit,),
                )
                .await
                .map_err(|e| format!("failed to query dead letters: {}", e))?;

            let rows_result = result
                .into_rows_result()
                .map_err(|e| format!("failed to read dead letter rows: {}", e))?;

            let mut records = Vec::new();
            let rows = rows_result
                .rows::<(Uuid, String, i32, i64, String, String, i32, DateTime<Utc>, DateTime<Utc>)>()
                .map_err(|e| format!("failed to type dead letter rows: {}", e))?;

            for row in rows {
                let (
                    id,
                    topic,
                    partition,
                    offset,
                    payload,
                    error_message,
                    failure_count,
                    first_failed_at,
                    last_failed_at,
                ) = row.map_err(|e| format!("failed to parse dead letter row: {}", e))?;

                records.push(DeadLetterRecord {
                    id,
                    topic,
                    partition,
                    offset,
                    payload,
                    error_message,
                    failure_count,
                    first_failed_at,
                    last_failed_at,
                });
            }

            Ok(records)
        })
    }
}

impl Handler<GetDlqStats> for DlqActor {
    type Result = ResponseFuture<Result<DlqStats, String>>;

    fn handle(&mut self, _msg: GetDlqStats, _: &mut Self::Context) -> Self::Result {
        let session = self.session.clone();

        Box::pin(async move {
            let result = session
                .query_unpaged("SELECT COUNT(*) FROM dead_letter_events", &[])
                .await
                .map_err(|e| format!("failed to count dead letters: {}", e))?;

            let total_messages = match result.into_rows_result() {
                Ok(rows_result) => rows_result
                    .maybe_first_row::<(i64,)>()
                    .ok()
                    .flatten()
                    .map(|(count,)| count)
                    .unwrap_or(0),
                Err(_) => 0,
            };

            Ok(DlqStats { total_messages })
        })
    }
}

// The worker talks to the sink port; in production that port is the actor's
// mailbox. Tests plug in an in-memory sink instead.
#[async_trait]
impl DeadLetterSink for Addr<DlqActor> {
    async fn record(&self, entry: DeadLetterEntry) -> Result<(), String> {
        match self.send(AddToDlq(entry)).await {
            Ok(result) => result,
            Err(e) => Err(format!("dead letter actor unavailable: {}", e)),
        }
    }
}
