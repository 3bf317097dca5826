use std::future::Future;
use std::pin::Pin;

use relay_api::{EventSummary, RawRecord};

/// What a handler did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Ran to completion; counts towards `messagesConsumed`.
    Processed,
    /// Dropped (malformed payload). Still acknowledged, never retried.
    Skipped,
}

/// Per-record interpretation, invoked by the consumer engine one record at
/// a time. Handlers never fail: anything that goes wrong while interpreting
/// a record is logged and reported as [`HandleOutcome::Skipped`].
pub trait RecordHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        record: &'a RawRecord,
    ) -> Pin<Box<dyn Future<Output = HandleOutcome> + Send + 'a>>;
}

/// Interprets records as JSON change events and logs their canonical fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeEventLogger;

impl ChangeEventLogger {
    /// Decode and parse a payload. Pure, so the same bytes always give the
    /// same answer.
    pub fn interpret(record: &RawRecord) -> Result<EventSummary, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(&record.text())?;
        Ok(EventSummary::from_value(&value))
    }
}

impl RecordHandler for ChangeEventLogger {
    fn handle<'a>(
        &'a self,
        record: &'a RawRecord,
    ) -> Pin<Box<dyn Future<Output = HandleOutcome> + Send + 'a>> {
        Box::pin(async move {
            match Self::interpret(record) {
                Ok(event) => {
                    tracing::info!(
                        target: "db_change_event",
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        timestamp = event.timestamp.as_deref(),
                        source = event.source.as_deref(),
                        event_type = event.event_type.as_deref(),
                        table = event.table.as_deref(),
                        user_id = event.user_id.as_deref(),
                        username = event.username.as_deref(),
                        "db change event"
                    );
                    HandleOutcome::Processed
                }
                Err(e) => {
                    tracing::error!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        raw = %record.text(),
                        error = %e,
                        "failed to parse change event"
                    );
                    HandleOutcome::Skipped
                }
            }
        })
    }
}

/// Treats every record as an opaque text message.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageLogger;

impl RecordHandler for MessageLogger {
    fn handle<'a>(
        &'a self,
        record: &'a RawRecord,
    ) -> Pin<Box<dyn Future<Output = HandleOutcome> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                value = %record.text(),
                "message consumed"
            );
            HandleOutcome::Processed
        })
    }
}
