//! Consumer health and throughput.
//!
//! One writer ([`MetricsRecorder`], owned by the consumer engine) and any
//! number of read-only views ([`MetricsView`], handed to status handlers).
//! `last_error` is sticky: once recorded it is only ever replaced by a newer
//! error, never cleared, so health stays degraded until the process exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use relay_api::iso_timestamp;

/// Snapshot of the most recently completed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastMessage {
    pub topic: String,
    /// Raw payload text.
    pub value: String,
    /// When the consumer finished handling it.
    #[serde(serialize_with = "serialize_iso")]
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub error: Option<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub messages_consumed: u64,
    pub last_message: Option<LastMessage>,
    pub last_error: Option<String>,
}

fn serialize_iso<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(*at))
}

#[derive(Default)]
struct Shared {
    messages_consumed: AtomicU64,
    last_message: RwLock<Option<LastMessage>>,
    last_error: RwLock<Option<String>>,
}

/// Create a recorder and its first view.
pub fn consumer_metrics() -> (MetricsRecorder, MetricsView) {
    let shared = Arc::new(Shared::default());
    (
        MetricsRecorder { shared: shared.clone() },
        MetricsView { shared },
    )
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// The only handle that can mutate consumer metrics. Deliberately not
/// `Clone`.
pub struct MetricsRecorder {
    shared: Arc<Shared>,
}

impl MetricsRecorder {
    /// A record's handler completed: overwrite the snapshot, bump the counter.
    pub fn record_message(&mut self, topic: &str, value: &str) {
        *write(&self.shared.last_message) = Some(LastMessage {
            topic: topic.to_string(),
            value: value.to_string(),
            ts: Utc::now(),
        });
        self.shared.messages_consumed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        *write(&self.shared.last_error) = Some(message.into());
    }

    pub fn view(&self) -> MetricsView {
        MetricsView { shared: self.shared.clone() }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MetricsView {
    shared: Arc<Shared>,
}

impl MetricsView {
    /// `degraded` iff an error was ever recorded.
    pub fn health(&self) -> HealthReport {
        let error = self.last_error();
        HealthReport {
            status: if error.is_some() {
                HealthStatus::Degraded
            } else {
                HealthStatus::Ok
            },
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_consumed: self.messages_consumed(),
            last_message: self.last_message(),
            last_error: self.last_error(),
        }
    }

    pub fn last_message(&self) -> Option<LastMessage> {
        read(&self.shared.last_message).clone()
    }

    pub fn last_error(&self) -> Option<String> {
        read(&self.shared.last_error).clone()
    }

    pub fn messages_consumed(&self) -> u64 {
        self.shared.messages_consumed.load(Ordering::SeqCst)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("metrics read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("metrics write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_and_empty() {
        let (_recorder, view) = consumer_metrics();
        assert_eq!(view.health().status, HealthStatus::Ok);
        assert_eq!(
            view.metrics(),
            MetricsSnapshot {
                messages_consumed: 0,
                last_message: None,
                last_error: None,
            }
        );
    }

    #[test]
    fn last_message_is_last_write_wins() {
        let (mut recorder, view) = consumer_metrics();
        recorder.record_message("t", "first");
        recorder.record_message("t", "second");

        assert_eq!(view.messages_consumed(), 2);
        let last = view.last_message().unwrap();
        assert_eq!(last.topic, "t");
        assert_eq!(last.value, "second");
    }

    #[test]
    fn error_is_sticky() {
        let (mut recorder, view) = consumer_metrics();
        recorder.record_error("connection: broker unavailable");
        // Successful traffic afterwards does not clear it.
        recorder.record_message("t", "ok");

        let health = view.health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.error.as_deref(), Some("connection: broker unavailable"));

        recorder.record_error("connection: timed out");
        assert_eq!(view.last_error().as_deref(), Some("connection: timed out"));
        assert_eq!(view.health().status, HealthStatus::Degraded);
    }

    #[test]
    fn views_share_state() {
        let (mut recorder, view) = consumer_metrics();
        let other = recorder.view();
        recorder.record_message("t", "x");
        assert_eq!(view.messages_consumed(), 1);
        assert_eq!(other.messages_consumed(), 1);
    }

    #[test]
    fn snapshot_serializes_with_wire_names() {
        let (mut recorder, view) = consumer_metrics();
        recorder.record_message("test-topic", "hello");
        let json = serde_json::to_value(view.metrics()).unwrap();

        assert_eq!(json["messagesConsumed"], 1);
        assert_eq!(json["lastMessage"]["topic"], "test-topic");
        assert_eq!(json["lastMessage"]["value"], "hello");
        assert!(json["lastMessage"]["ts"].as_str().unwrap().ends_with('Z'));
        assert_eq!(json["lastError"], serde_json::Value::Null);

        let health = serde_json::to_value(view.health()).unwrap();
        assert_eq!(health["status"], "ok");
    }
}
