//! In-process broker: partitioned append-only topic logs with per-group
//! committed offsets.
//!
//! Used by the `standalone` mode and by tests. Topics are created on first
//! use. `set_available(false)` simulates an outage: connects, sends,
//! fetches and commits fail with connection/publish errors until the broker
//! is made available again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use relay_api::{
    BrokerConsumer, BrokerError, BrokerFuture, BrokerProducer, Delivery, RawRecord,
    SubscribeOptions,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

struct TopicLog {
    partitions: Vec<Vec<Vec<u8>>>,
    next_partition: usize,
}

impl TopicLog {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: vec![Vec::new(); partitions],
            next_partition: 0,
        }
    }
}

#[derive(Default)]
struct State {
    topics: HashMap<String, TopicLog>,
    /// (group, topic, partition) → next offset to read.
    committed: HashMap<(String, String, i32), i64>,
}

struct Inner {
    partitions: usize,
    state: Mutex<State>,
    available: AtomicBool,
    /// Bumped on every append and availability change.
    changes: watch::Sender<u64>,
}

/// Handle to a shared in-process broker. Cheap to clone.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MemoryBroker {
    /// Broker whose topics all have `partitions` partitions (at least one).
    pub fn new(partitions: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                state: Mutex::new(State::default()),
                available: AtomicBool::new(true),
                changes,
            }),
        }
    }

    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            changes: self.inner.changes.subscribe(),
            broker: self.clone(),
            connected: false,
            subscription: None,
            positions: Vec::new(),
            cursor: 0,
        }
    }

    /// Toggle a simulated outage.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        tracing::debug!(available, "memory broker availability changed");
        self.inner.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Append directly to a partition, bypassing producer round-robin.
    pub fn append(
        &self,
        topic: &str,
        partition: i32,
        payload: Vec<u8>,
    ) -> Result<Delivery, BrokerError> {
        if !self.is_available() {
            return Err(BrokerError::publish("broker unavailable"));
        }
        let delivery = {
            let mut state = self.lock();
            let partitions = self.inner.partitions;
            let log = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicLog::new(partitions));
            let slot = usize::try_from(partition)
                .ok()
                .and_then(|p| log.partitions.get_mut(p))
                .ok_or_else(|| {
                    BrokerError::publish(format!("topic '{topic}' has no partition {partition}"))
                })?;
            slot.push(payload);
            Delivery {
                partition,
                offset: slot.len() as i64 - 1,
            }
        };
        self.inner.changes.send_modify(|v| *v = v.wrapping_add(1));
        Ok(delivery)
    }

    /// All records of a topic, partition by partition, in offset order.
    pub fn records(&self, topic: &str) -> Vec<RawRecord> {
        let state = self.lock();
        let Some(log) = state.topics.get(topic) else {
            return Vec::new();
        };
        log.partitions
            .iter()
            .enumerate()
            .flat_map(|(p, values)| {
                values.iter().enumerate().map(move |(offset, value)| RawRecord {
                    topic: topic.to_string(),
                    partition: p as i32,
                    offset: offset as i64,
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Next offset the group will read from a partition, if it committed one.
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .committed
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    fn send_round_robin(&self, topic: &str, payload: Vec<u8>) -> Result<Delivery, BrokerError> {
        let partition = {
            let mut state = self.lock();
            let partitions = self.inner.partitions;
            let log = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicLog::new(partitions));
            let p = log.next_partition;
            log.next_partition = (p + 1) % partitions;
            p as i32
        };
        self.append(topic, partition, payload)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.inner.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory broker lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryProducer
// ═══════════════════════════════════════════════════════════════

pub struct MemoryProducer {
    broker: MemoryBroker,
    connected: AtomicBool,
}

impl BrokerProducer for MemoryProducer {
    fn connect(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            if !self.broker.is_available() {
                return Err(BrokerError::connection("broker unavailable"));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn send(&self, topic: &str, payload: Vec<u8>) -> BrokerFuture<'_, Delivery> {
        let topic = topic.to_string();
        Box::pin(async move {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(BrokerError::logic("producer is not connected"));
            }
            self.broker.send_round_robin(&topic, payload)
        })
    }

    fn disconnect(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryConsumer
// ═══════════════════════════════════════════════════════════════

/// Single-member consumer: a group served by a `MemoryConsumer` owns every
/// partition of the subscribed topic.
pub struct MemoryConsumer {
    broker: MemoryBroker,
    changes: watch::Receiver<u64>,
    connected: bool,
    subscription: Option<SubscribeOptions>,
    /// Next offset to fetch, per partition.
    positions: Vec<i64>,
    /// Partition to try first on the next fetch.
    cursor: usize,
}

impl MemoryConsumer {
    fn try_fetch(&mut self) -> Option<RawRecord> {
        let topic = &self.subscription.as_ref()?.topic;
        let state = self.broker.lock();
        let log = state.topics.get(topic)?;
        let n = log.partitions.len();
        for i in 0..n {
            let p = (self.cursor + i) % n;
            let (Some(values), Some(position)) = (log.partitions.get(p), self.positions.get_mut(p))
            else {
                continue;
            };
            if let Some(value) = usize::try_from(*position).ok().and_then(|o| values.get(o)) {
                let record = RawRecord {
                    topic: topic.clone(),
                    partition: p as i32,
                    offset: *position,
                    value: value.clone(),
                };
                *position += 1;
                self.cursor = (p + 1) % n;
                return Some(record);
            }
        }
        None
    }
}

impl BrokerConsumer for MemoryConsumer {
    fn connect(&mut self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            if !self.broker.is_available() {
                return Err(BrokerError::connection("broker unavailable"));
            }
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
            if !self.broker.is_available() {
                return Err(BrokerError::connection("broker unavailable"));
            }

            let positions = {
                let mut state = self.broker.lock();
                let partitions = self.broker.inner.partitions;
                let ends: Vec<i64> = state
                    .topics
                    .entry(options.topic.clone())
                    .or_insert_with(|| TopicLog::new(partitions))
                    .partitions
                    .iter()
                    .map(|values| values.len() as i64)
                    .collect();
                ends.iter()
                    .enumerate()
                    .map(|(p, end)| {
                        let key = (options.group_id.clone(), options.topic.clone(), p as i32);
                        match state.committed.get(&key) {
                            Some(offset) => *offset,
                            None if options.from_beginning => 0,
                            None => *end,
                        }
                    })
                    .collect()
            };

            tracing::debug!(
                topic = %options.topic,
                group = %options.group_id,
                ?positions,
                "memory consumer subscribed"
            );
            self.positions = positions;
            self.cursor = 0;
            self.subscription = Some(options);
            Ok(())
        })
    }

    fn next_record(&mut self) -> BrokerFuture<'_, Option<RawRecord>> {
        Box::pin(async move {
            loop {
                self.changes.borrow_and_update();

                if !self.connected || self.subscription.is_none() {
                    return Err(BrokerError::logic("consumer is not subscribed"));
                }
                if !self.broker.is_available() {
                    return Err(BrokerError::connection("broker unavailable"));
                }
                if let Some(record) = self.try_fetch() {
                    return Ok(Some(record));
                }
                if self.changes.changed().await.is_err() {
                    return Ok(None);
                }
            }
        })
    }

    fn commit(&mut self, record: &RawRecord) -> BrokerFuture<'_, ()> {
        let record_topic = record.topic.clone();
        let partition = record.partition;
        let next = record.offset + 1;
        Box::pin(async move {
            let group = match &self.subscription {
                Some(s) => s.group_id.clone(),
                None => return Err(BrokerError::logic("consumer is not subscribed")),
            };
            if !self.broker.is_available() {
                return Err(BrokerError::connection("broker unavailable"));
            }
            let mut state = self.broker.lock();
            let slot = state
                .committed
                .entry((group, record_topic, partition))
                .or_insert(next);
            *slot = (*slot).max(next);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            self.connected = false;
            self.subscription = None;
            self.positions.clear();
            Ok(())
        })
    }
}
