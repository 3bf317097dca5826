use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use relay_api::{BrokerConsumer, BrokerError, RawRecord, SubscribeOptions};

use crate::error::ConsumerError;
use crate::handler::{HandleOutcome, RecordHandler};
use crate::metrics::{MetricsRecorder, MetricsView};

/// Lifecycle of a [`ConsumerEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
    Consuming,
    /// A broker error was recorded; the engine is waiting to reconnect.
    Degraded,
    /// A broker error ended the engine under [`FailurePolicy::Fatal`].
    Terminated,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsumerState::Disconnected => "disconnected",
            ConsumerState::Connecting => "connecting",
            ConsumerState::Subscribed => "subscribed",
            ConsumerState::Consuming => "consuming",
            ConsumerState::Degraded => "degraded",
            ConsumerState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// What a broker-level error (connect, subscribe, fetch, commit) does to
/// the consumer. Parse errors never reach the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and stop; `run` returns [`ConsumerError::Fatal`].
    Fatal,
    /// Record into `lastError`, wait `retry_backoff`, reconnect. Forever.
    Degraded { retry_backoff: Duration },
}

impl FailurePolicy {
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

    pub fn degraded() -> Self {
        FailurePolicy::Degraded {
            retry_backoff: Self::DEFAULT_RETRY_BACKOFF,
        }
    }
}

enum SessionEnd {
    Shutdown,
    Closed,
}

/// Subscribes to one topic under one consumer group and feeds every record
/// to a [`RecordHandler`], one at a time.
///
/// A record is committed only after its handler returned, so a crash between
/// the two leads to redelivery, never to loss. Shutdown is checked between
/// records only: the in-flight handler always finishes.
pub struct ConsumerEngine {
    name: String,
    consumer: Box<dyn BrokerConsumer>,
    options: SubscribeOptions,
    policy: FailurePolicy,
    metrics: MetricsRecorder,
    state: ConsumerState,
}

impl ConsumerEngine {
    pub fn new(
        name: impl Into<String>,
        consumer: Box<dyn BrokerConsumer>,
        options: SubscribeOptions,
        policy: FailurePolicy,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            name: name.into(),
            consumer,
            options,
            policy,
            metrics,
            state: ConsumerState::Disconnected,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Read-only view of the metrics this engine writes.
    pub fn metrics(&self) -> MetricsView {
        self.metrics.view()
    }

    /// Establish the broker session.
    pub async fn connect(&mut self) -> Result<(), BrokerError> {
        self.transition(ConsumerState::Connecting);
        self.consumer.connect().await
    }

    /// Register the group's interest in the configured topic.
    pub async fn subscribe(&mut self) -> Result<(), BrokerError> {
        self.consumer.subscribe(&self.options).await?;
        self.transition(ConsumerState::Subscribed);
        tracing::info!(
            consumer = %self.name,
            topic = %self.options.topic,
            group = %self.options.group_id,
            from_beginning = self.options.from_beginning,
            "subscribed"
        );
        Ok(())
    }

    /// Consume until `shutdown` is cancelled, applying the failure policy
    /// to every broker error. Connects and subscribes first unless that
    /// already happened.
    ///
    /// Returns `Ok(())` after a clean shutdown (state `Disconnected`), or
    /// [`ConsumerError::Fatal`] under the fatal policy (state `Terminated`).
    pub async fn run(
        &mut self,
        handler: &dyn RecordHandler,
        shutdown: &CancellationToken,
    ) -> Result<(), ConsumerError> {
        loop {
            let err = match self.session(handler, shutdown).await {
                Ok(SessionEnd::Shutdown) => {
                    self.close().await;
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => BrokerError::connection("broker closed the session"),
                Err(e) => e,
            };

            match self.policy {
                FailurePolicy::Fatal => {
                    tracing::error!(
                        consumer = %self.name,
                        error = %err,
                        "consumer error, terminating"
                    );
                    self.disconnect_quietly().await;
                    self.transition(ConsumerState::Terminated);
                    return Err(ConsumerError::Fatal {
                        consumer: self.name.clone(),
                        source: err,
                    });
                }
                FailurePolicy::Degraded { retry_backoff } => {
                    tracing::error!(
                        consumer = %self.name,
                        error = %err,
                        retry_in = ?retry_backoff,
                        "consumer error, continuing degraded"
                    );
                    self.metrics.record_error(err.to_string());
                    self.disconnect_quietly().await;
                    self.transition(ConsumerState::Degraded);

                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            self.close().await;
                            return Ok(());
                        }
                        _ = tokio::time::sleep(retry_backoff) => {}
                    }
                }
            }
        }
    }

    /// One broker session: (re)connect, subscribe, then consume.
    async fn session(
        &mut self,
        handler: &dyn RecordHandler,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd, BrokerError> {
        if self.state != ConsumerState::Subscribed {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                r = self.connect() => r?,
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                r = self.subscribe() => r?,
            }
        }

        self.transition(ConsumerState::Consuming);
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                r = self.consumer.next_record() => r?,
            };
            let Some(record) = next else {
                return Ok(SessionEnd::Closed);
            };

            self.process(handler, &record).await;
            self.consumer.commit(&record).await?;
        }
    }

    async fn process(&mut self, handler: &dyn RecordHandler, record: &RawRecord) {
        match handler.handle(record).await {
            HandleOutcome::Processed => {
                self.metrics.record_message(&record.topic, &record.text());
            }
            HandleOutcome::Skipped => {
                tracing::debug!(
                    consumer = %self.name,
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "record skipped"
                );
            }
        }
    }

    async fn close(&mut self) {
        self.disconnect_quietly().await;
        self.transition(ConsumerState::Disconnected);
        tracing::info!(consumer = %self.name, "consumer stopped");
    }

    async fn disconnect_quietly(&mut self) {
        if let Err(e) = self.consumer.disconnect().await {
            tracing::warn!(consumer = %self.name, error = %e, "disconnect failed");
        }
    }

    fn transition(&mut self, next: ConsumerState) {
        if self.state != next {
            tracing::debug!(consumer = %self.name, from = %self.state, to = %next, "state change");
            self.state = next;
        }
    }
}
