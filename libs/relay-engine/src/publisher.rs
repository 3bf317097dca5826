use std::sync::Arc;

use tokio::sync::OnceCell;

use relay_api::{BrokerProducer, ChangeEvent, Delivery, now_iso};

use crate::error::PublishError;

/// Owns the producer session and appends events to topics.
pub struct EventPublisher {
    producer: Arc<dyn BrokerProducer>,
    connected: OnceCell<()>,
}

impl EventPublisher {
    pub fn new(producer: Arc<dyn BrokerProducer>) -> Self {
        Self {
            producer,
            connected: OnceCell::new(),
        }
    }

    /// Establish the broker session. Safe to call more than once; only the
    /// first successful call reaches the broker.
    pub async fn connect(&self) -> Result<(), PublishError> {
        self.connected
            .get_or_try_init(|| async { self.producer.connect().await })
            .await
            .map_err(PublishError::Connect)?;
        tracing::info!("event publisher connected");
        Ok(())
    }

    /// Stamp `timestamp`, serialize to JSON and append to `topic`.
    ///
    /// Returns once the broker acknowledged the write. The caller decides
    /// what a failure means; see [`ChangeNotifier`] for the best-effort path.
    pub async fn publish(
        &self,
        topic: &str,
        mut event: ChangeEvent,
    ) -> Result<Delivery, PublishError> {
        event.stamp(now_iso());
        let payload = event.to_payload()?;
        self.send(topic, payload).await
    }

    /// Append an opaque text payload to `topic`.
    pub async fn publish_text(&self, topic: &str, text: &str) -> Result<Delivery, PublishError> {
        self.send(topic, text.as_bytes().to_vec()).await
    }

    pub async fn disconnect(&self) -> Result<(), PublishError> {
        self.producer.disconnect().await.map_err(PublishError::Disconnect)
    }

    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<Delivery, PublishError> {
        let delivery = self
            .producer
            .send(topic, payload)
            .await
            .map_err(|source| PublishError::Broker {
                topic: topic.to_string(),
                source,
            })?;
        tracing::debug!(
            topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "published"
        );
        Ok(delivery)
    }
}

/// Best-effort change notification for collaborators that must not fail
/// because of the broker.
///
/// `notify` has no error channel: a failed publish is logged here and the
/// caller carries on with its own result.
#[derive(Clone)]
pub struct ChangeNotifier {
    publisher: Arc<EventPublisher>,
    topic: String,
}

impl ChangeNotifier {
    pub fn new(publisher: Arc<EventPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn notify(&self, event: ChangeEvent) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.publisher.publish(&self.topic, event).await {
            tracing::error!(
                topic = %self.topic,
                event_type = %event_type,
                error = %e,
                "failed to send change event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_api::{EventType, ErrorKind};
    use relay_broker_memory::MemoryBroker;

    fn publisher(broker: &MemoryBroker) -> EventPublisher {
        EventPublisher::new(Arc::new(broker.producer()))
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        publisher.connect().await.unwrap();
        publisher.connect().await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let broker = MemoryBroker::default();
        broker.set_available(false);
        let err = publisher(&broker).connect().await.unwrap_err();
        assert!(matches!(err, PublishError::Connect(e) if e.kind() == ErrorKind::Connection));
    }

    #[tokio::test]
    async fn publish_stamps_timestamp_over_caller_value() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        publisher.connect().await.unwrap();

        let mut event = ChangeEvent::new("api", EventType::TokenCreated, "tokens")
            .with_user(Some("1".to_string()), "alice");
        event.timestamp = Some("1999-01-01T00:00:00.000Z".to_string());
        publisher.publish("db-changes", event).await.unwrap();

        let records = broker.records("db-changes");
        assert_eq!(records.len(), 1);
        let value: serde_json::Value = serde_json::from_slice(&records[0].value).unwrap();
        let ts = value["timestamp"].as_str().unwrap();
        assert_ne!(ts, "1999-01-01T00:00:00.000Z");
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(value["eventType"], "TOKEN_CREATED");
    }

    #[tokio::test]
    async fn publish_stamps_timestamp_over_extra_field() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        publisher.connect().await.unwrap();

        let event = ChangeEvent::new("api", EventType::TokenCreated, "tokens")
            .with_user(Some("1".to_string()), "alice")
            .with_field("timestamp", "1999-01-01T00:00:00.000Z");
        publisher.publish("db-changes", event).await.unwrap();

        let records = broker.records("db-changes");
        let summary = crate::ChangeEventLogger::interpret(&records[0]).unwrap();
        let ts = summary.timestamp.unwrap();
        assert_ne!(ts, "1999-01-01T00:00:00.000Z");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[tokio::test]
    async fn publish_text_is_sent_verbatim() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        publisher.connect().await.unwrap();

        let delivery = publisher.publish_text("test-topic", "hello").await.unwrap();
        assert_eq!(delivery.offset, 0);
        assert_eq!(broker.records("test-topic")[0].value, b"hello");
    }

    #[tokio::test]
    async fn broker_failure_surfaces_as_publish_error() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        publisher.connect().await.unwrap();
        broker.set_available(false);

        let err = publisher.publish_text("t", "x").await.unwrap_err();
        assert!(matches!(err, PublishError::Broker { ref topic, .. } if topic == "t"));
    }

    #[tokio::test]
    async fn notifier_swallows_failures() {
        let broker = MemoryBroker::default();
        let publisher = Arc::new(publisher(&broker));
        publisher.connect().await.unwrap();
        let notifier = ChangeNotifier::new(publisher, "db-changes");

        broker.set_available(false);
        notifier
            .notify(ChangeEvent::new("api", EventType::TokenCreated, "tokens"))
            .await;
        assert!(broker.records("db-changes").is_empty());

        broker.set_available(true);
        notifier
            .notify(ChangeEvent::new("api", EventType::TokenCreated, "tokens"))
            .await;
        assert_eq!(broker.records("db-changes").len(), 1);
    }
}
