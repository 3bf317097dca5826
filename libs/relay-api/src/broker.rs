use std::future::Future;
use std::pin::Pin;

use crate::{BrokerError, Delivery, RawRecord, SubscribeOptions};

/// Boxed future returned by broker trait methods.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

// ════════════════════════════════════════════════════════════════
//  Broker Traits
// ════════════════════════════════════════════════════════════════

/// Producer side of a broker session.
///
/// Implementations: `MemoryProducer` (in-process), `KafkaProducer` (rdkafka).
/// Shared between tasks behind an `Arc`, so every method takes `&self`.
pub trait BrokerProducer: Send + Sync {
    /// Establish the session. Calling it on a connected producer is a no-op.
    fn connect(&self) -> BrokerFuture<'_, ()>;

    /// Append `payload` to `topic`. Resolves once the partition leader
    /// acknowledged the write. No retries beyond what the client library
    /// does on its own.
    fn send(&self, topic: &str, payload: Vec<u8>) -> BrokerFuture<'_, Delivery>;

    /// Flush pending sends and close the session.
    fn disconnect(&self) -> BrokerFuture<'_, ()>;
}

/// Consumer side of a broker session.
///
/// Owned by exactly one consumer task, hence `&mut self`: records are handed
/// out one at a time and the next one is requested only after the previous
/// handler completed.
pub trait BrokerConsumer: Send {
    /// Establish the session.
    fn connect(&mut self) -> BrokerFuture<'_, ()>;

    /// Register the group's interest in a topic.
    fn subscribe(&mut self, options: &SubscribeOptions) -> BrokerFuture<'_, ()>;

    /// Wait for the next record. Records of one partition arrive in offset
    /// order; there is no ordering across partitions. `Ok(None)` means the
    /// session was closed.
    fn next_record(&mut self) -> BrokerFuture<'_, Option<RawRecord>>;

    /// Mark `record` as processed for the subscribed group. Called only
    /// after the record's handler returned.
    fn commit(&mut self, record: &RawRecord) -> BrokerFuture<'_, ()>;

    /// Close the session.
    fn disconnect(&mut self) -> BrokerFuture<'_, ()>;
}
