//! Kafka broker backend on top of `rdkafka`.
//!
//! Producer: `acks=1`, no extra retries. Consumer: one `StreamConsumer` per
//! subscription, auto-commit disabled; offsets are committed explicitly
//! after each record's handler returned. Per-partition consume errors (a
//! topic that does not exist yet, partition EOF) are logged and skipped;
//! only transport and session failures surface as connection errors.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use relay_api::{
    BrokerConsumer, BrokerError, BrokerFuture, BrokerProducer, Delivery, RawRecord,
    SubscribeOptions,
};

/// Connection settings shared by producers and consumers.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Upper bound for metadata requests, flushes and per-message delivery.
    pub timeout: Duration,
}

impl KafkaConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(brokers: Vec<String>, client_id: impl Into<String>) -> Self {
        Self {
            brokers,
            client_id: client_id.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    fn base(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("client.id", &self.client_id);
        config
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = self.base();
        config
            .set("acks", "1")
            .set("message.timeout.ms", self.timeout.as_millis().to_string());
        config
    }

    fn consumer_config(&self, options: &SubscribeOptions) -> ClientConfig {
        let mut config = self.base();
        config
            .set("group.id", &options.group_id)
            .set("enable.auto.commit", "false")
            .set("allow.auto.create.topics", "true")
            .set(
                "auto.offset.reset",
                if options.from_beginning { "earliest" } else { "latest" },
            );
        config
    }
}

fn connection(e: KafkaError) -> BrokerError {
    BrokerError::connection(e.to_string())
}

/// Whether a `recv` error concerns a single partition and the session is
/// still usable.
fn recoverable(e: &KafkaError) -> bool {
    match e {
        KafkaError::PartitionEOF(_) => true,
        KafkaError::MessageConsumption(code) => !matches!(
            code,
            RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::Authentication
                | RDKafkaErrorCode::Fatal
        ),
        _ => false,
    }
}

fn config_error(e: KafkaError) -> BrokerError {
    BrokerError::config(e.to_string())
}

/// Blocking metadata round trip, used to verify the cluster is reachable.
async fn probe<C>(client: C, timeout: Duration) -> Result<(), BrokerError>
where
    C: Fn(Duration) -> Result<(), KafkaError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || client(timeout))
        .await
        .map_err(|e| BrokerError::connection(format!("metadata task: {e}")))?
        .map_err(connection)
}

// ═══════════════════════════════════════════════════════════════
//  KafkaProducer
// ═══════════════════════════════════════════════════════════════

pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaProducer {
    /// Create the client. Nothing is sent over the network until
    /// [`BrokerProducer::connect`].
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer =
            config.producer_config().create().map_err(config_error)?;
        Ok(Self {
            producer,
            timeout: config.timeout,
        })
    }
}

impl BrokerProducer for KafkaProducer {
    fn connect(&self) -> BrokerFuture<'_, ()> {
        let producer = self.producer.clone();
        Box::pin(probe(
            move |timeout| producer.client().fetch_metadata(None, timeout).map(|_| ()),
            self.timeout,
        ))
    }

    fn send(&self, topic: &str, payload: Vec<u8>) -> BrokerFuture<'_, Delivery> {
        let topic = topic.to_string();
        Box::pin(async move {
            let record = FutureRecord::<(), [u8]>::to(&topic).payload(&payload);
            let (partition, offset) = self
                .producer
                .send(record, Timeout::After(self.timeout))
                .await
                .map_err(|(e, _)| BrokerError::publish(e.to_string()))?;
            Ok(Delivery { partition, offset })
        })
    }

    fn disconnect(&self) -> BrokerFuture<'_, ()> {
        let producer = self.producer.clone();
        Box::pin(probe(move |timeout| producer.flush(timeout), self.timeout))
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaConsumer
// ═══════════════════════════════════════════════════════════════

/// Consumer session. The underlying `StreamConsumer` is created on
/// `subscribe`, because group id and reset policy are subscription
/// settings.
pub struct KafkaConsumer {
    config: KafkaConfig,
    connected: bool,
    consumer: Option<StreamConsumer>,
}

impl KafkaConsumer {
    pub fn new(config: KafkaConfig) -> Self {
        Self {
            config,
            connected: false,
            consumer: None,
        }
    }
}

impl BrokerConsumer for KafkaConsumer {
    fn connect(&mut self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            let probe_client: BaseConsumer = self.config.base().create().map_err(config_error)?;
            probe(
                move |timeout| probe_client.fetch_metadata(None, timeout).map(|_| ()),
                self.config.timeout,
            )
            .await?;
            self.connected = true;
            Ok(())
        })
    }

    fn subscribe(&mut self, options: &SubscribeOptions) -> BrokerFuture<'_, ()> {
        let options = options.clone();
        Box::pin(async move {
            if !self.connected {
                return Err(BrokerError::logic("consumer is not connected"));
            }
            let consumer: StreamConsumer = self
                .config
                .consumer_config(&options)
                .create()
                .map_err(config_error)?;
            consumer
                .subscribe(&[options.topic.as_str()])
                .map_err(|e| {
                    connection(e).with_context(format!("subscribe '{}'", options.topic))
                })?;
            tracing::debug!(
                topic = %options.topic,
                group = %options.group_id,
                "kafka consumer subscribed"
            );
            self.consumer = Some(consumer);
            Ok(())
        })
    }

    fn next_record(&mut self) -> BrokerFuture<'_, Option<RawRecord>> {
        Box::pin(async move {
            let Some(consumer) = self.consumer.as_ref() else {
                return Err(BrokerError::logic("consumer is not subscribed"));
            };
            loop {
                match consumer.recv().await {
                    Ok(message) => return Ok(Some(record_from(&message))),
                    Err(e) if recoverable(&e) => {
                        tracing::warn!(error = %e, "kafka consume error, still listening");
                    }
                    Err(e) => return Err(connection(e)),
                }
            }
        })
    }

    fn commit(&mut self, record: &RawRecord) -> BrokerFuture<'_, ()> {
        let mut offsets = TopicPartitionList::new();
        let added = offsets.add_partition_offset(
            &record.topic,
            record.partition,
            Offset::Offset(record.offset + 1),
        );
        Box::pin(async move {
            added.map_err(config_error)?;
            let Some(consumer) = self.consumer.as_ref() else {
                return Err(BrokerError::logic("consumer is not subscribed"));
            };
            consumer.commit(&offsets, CommitMode::Async).map_err(connection)
        })
    }

    fn disconnect(&mut self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            if let Some(consumer) = self.consumer.take() {
                consumer.unsubscribe();
            }
            self.connected = false;
            Ok(())
        })
    }
}

fn record_from<M: Message>(message: &M) -> RawRecord {
    RawRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}
