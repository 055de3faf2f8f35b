// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory bus for tests.
//!
//! Emulates the slice of broker behavior the workspace contracts on:
//! subject routing with `*`/`>` wildcards, stream capture with work-queue
//! retention, durable consumers with redelivery (nak delay and ack-wait
//! expiry), max-deliver exhaustion emitting a DLQ advisory, and KV buckets
//! with per-key CAS revisions and TTL. Time flows through `tokio::time`,
//! so tests under `start_paused` drive redelivery deterministically.

use crate::dlq::MaxDeliverAdvisory;
use crate::error::BusError;
use crate::traits::{
    Acker, BusHealth, ConsumerSpec, ConsumerStats, Delivery, InboundMessage, KvBucket, KvEntry,
    KvSpec, KvStats, MessageBus, StreamSpec, StreamStats,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

const CHANNEL_CAPACITY: usize = 256;

/// NATS-style token matching: `*` is one token, `>` is one or more.
fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.');
    let mut subject = subject.split('.');
    loop {
        match (pattern.next(), subject.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[derive(Clone)]
struct StoredMessage {
    subject: String,
    headers: Vec<(String, String)>,
    payload: Bytes,
}

struct ConsumerState {
    spec: ConsumerSpec,
    notify: Arc<Notify>,
    /// Next stream sequence the first-delivery scan starts from.
    cursor: u64,
    /// Redeliveries ready now.
    ready: VecDeque<u64>,
    inflight: HashSet<u64>,
    attempts: HashMap<u64, u64>,
    done: HashSet<u64>,
}

struct StreamState {
    spec: StreamSpec,
    messages: BTreeMap<u64, StoredMessage>,
    next_seq: u64,
    consumers: HashMap<String, ConsumerState>,
}

struct KvState {
    ttl: Option<Duration>,
    next_revision: u64,
    entries: HashMap<String, MemEntry>,
}

struct MemEntry {
    value: Bytes,
    revision: u64,
    expires_at: Option<Instant>,
}

impl KvState {
    fn live_entry(&self, key: &str, now: Instant) -> Option<&MemEntry> {
        self.entries
            .get(key)
            .filter(|e| e.expires_at.is_none_or(|deadline| deadline > now))
    }
}

struct Subscriber {
    pattern: String,
    tx: mpsc::Sender<InboundMessage>,
}

#[derive(Default)]
struct State {
    streams: HashMap<String, StreamState>,
    buckets: HashMap<String, KvState>,
    subscribers: Vec<Subscriber>,
}

/// In-process bus; clones share state.
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<State>>,
    inbox_seq: Arc<AtomicU64>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(State::default())), inbox_seq: Arc::new(AtomicU64::new(0)) }
    }

    /// Route a message: capture into matching streams, fan out to live
    /// subscribers. Returns how many streams captured it.
    async fn route(
        &self,
        subject: &str,
        headers: &[(String, String)],
        payload: Bytes,
        reply: Option<String>,
    ) -> usize {
        let (captured, senders) = {
            let mut state = self.state.lock();
            let mut captured = 0;
            let mut notifies = Vec::new();
            for stream in state.streams.values_mut() {
                if stream.spec.subjects.iter().any(|p| subject_matches(p, subject)) {
                    let seq = stream.next_seq;
                    stream.next_seq += 1;
                    stream.messages.insert(
                        seq,
                        StoredMessage {
                            subject: subject.to_string(),
                            headers: headers.to_vec(),
                            payload: payload.clone(),
                        },
                    );
                    captured += 1;
                    for consumer in stream.consumers.values() {
                        notifies.push(consumer.notify.clone());
                    }
                }
            }
            state.subscribers.retain(|s| !s.tx.is_closed());
            let senders: Vec<mpsc::Sender<InboundMessage>> = state
                .subscribers
                .iter()
                .filter(|s| subject_matches(&s.pattern, subject))
                .map(|s| s.tx.clone())
                .collect();
            for notify in notifies {
                notify.notify_one();
            }
            (captured, senders)
        };

        for tx in senders {
            let _ = tx
                .send(InboundMessage {
                    subject: subject.to_string(),
                    payload: payload.clone(),
                    headers: headers.to_vec(),
                    reply: reply.clone(),
                })
                .await;
        }
        captured
    }

    /// Pop the next deliverable sequence for a consumer, marking it
    /// in-flight. Returns the message, its attempt number, and the
    /// ack-wait deadline spawn data.
    fn next_delivery(&self, stream_name: &str, durable: &str) -> Option<(u64, StoredMessage, u64)> {
        let mut state = self.state.lock();
        let stream = state.streams.get_mut(stream_name)?;
        let StreamState { ref messages, ref mut consumers, .. } = *stream;
        let consumer = consumers.get_mut(durable)?;

        // Redeliveries first, then the first-delivery scan.
        let seq = if let Some(seq) = consumer.ready.pop_front() {
            Some(seq)
        } else {
            let mut found = None;
            for (&seq, message) in messages.range(consumer.cursor..) {
                if consumer.done.contains(&seq) || consumer.inflight.contains(&seq) {
                    continue;
                }
                if subject_matches(&consumer.spec.filter_subject, &message.subject) {
                    found = Some(seq);
                    break;
                }
            }
            if let Some(seq) = found {
                consumer.cursor = seq + 1;
            }
            found
        }?;

        let message = messages.get(&seq)?.clone();
        let attempt = consumer.attempts.entry(seq).or_insert(0);
        *attempt += 1;
        let attempt = *attempt;
        consumer.inflight.insert(seq);
        Some((seq, message, attempt))
    }

    /// A delivery went unresolved (ack-wait expired) or was nak'd: queue a
    /// redelivery, or emit the max-deliver advisory when exhausted.
    async fn requeue(&self, stream_name: &str, durable: &str, seq: u64) {
        let advisory = {
            let mut state = self.state.lock();
            let Some(stream) = state.streams.get_mut(stream_name) else {
                return;
            };
            let Some(consumer) = stream.consumers.get_mut(durable) else {
                return;
            };
            if !consumer.inflight.remove(&seq) {
                return;
            }
            let attempts = consumer.attempts.get(&seq).copied().unwrap_or(0);
            if attempts >= consumer.spec.max_deliver.max(1) as u64 {
                consumer.done.insert(seq);
                Some(MaxDeliverAdvisory::new(stream_name, durable, seq, attempts))
            } else {
                consumer.ready.push_back(seq);
                consumer.notify.notify_one();
                None
            }
        };

        if let Some(advisory) = advisory {
            let subject = format!(
                "$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.{stream_name}.{durable}"
            );
            let payload = match serde_json::to_vec(&advisory) {
                Ok(payload) => Bytes::from(payload),
                Err(_) => return,
            };
            self.route(&subject, &[], payload, None).await;
        }
    }

    fn resolve(&self, stream_name: &str, durable: &str, seq: u64, remove_message: bool) {
        let mut state = self.state.lock();
        let Some(stream) = state.streams.get_mut(stream_name) else {
            return;
        };
        let work_queue = stream.spec.work_queue;
        let Some(consumer) = stream.consumers.get_mut(durable) else {
            return;
        };
        consumer.inflight.remove(&seq);
        consumer.done.insert(seq);
        if remove_message && work_queue {
            stream.messages.remove(&seq);
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(
        &self,
        subject: &str,
        headers: &[(String, String)],
        payload: Bytes,
    ) -> Result<(), BusError> {
        self.route(subject, headers, payload, None).await;
        Ok(())
    }

    async fn publish_durable(
        &self,
        subject: &str,
        headers: &[(String, String)],
        payload: Bytes,
    ) -> Result<(), BusError> {
        let captured = self.route(subject, headers, payload, None).await;
        if captured == 0 {
            return Err(BusError::Publish {
                subject: subject.to_string(),
                reason: "no stream captures subject".to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<InboundMessage>, BusError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.state
            .lock()
            .subscribers
            .push(Subscriber { pattern: subject.to_string(), tx });
        Ok(rx)
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, BusError> {
        let inbox = format!("_inbox.{}", self.inbox_seq.fetch_add(1, Ordering::Relaxed));
        let mut rx = self.subscribe(&inbox).await?;
        let heard = self
            .route(subject, &[], payload, Some(inbox.clone()))
            .await;

        // Core-NATS request semantics: no listener at all answers fast.
        let has_listener = heard > 0 || {
            let state = self.state.lock();
            state
                .subscribers
                .iter()
                .any(|s| s.pattern != inbox && subject_matches(&s.pattern, subject))
        };
        if !has_listener {
            return Err(BusError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Ok(msg.payload),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout { subject: subject.to_string(), timeout }),
        }
    }

    async fn ensure_stream(&self, spec: StreamSpec) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.streams.entry(spec.name.clone()).or_insert_with(|| StreamState {
            spec,
            messages: BTreeMap::new(),
            next_seq: 1,
            consumers: HashMap::new(),
        });
        Ok(())
    }

    async fn ensure_kv(&self, spec: KvSpec) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.buckets.entry(spec.bucket.clone()).or_insert_with(|| KvState {
            ttl: spec.ttl,
            next_revision: 0,
            entries: HashMap::new(),
        });
        Ok(())
    }

    fn kv(&self, bucket: &str) -> Arc<dyn KvBucket> {
        Arc::new(MemoryKv { bus: self.clone(), bucket: bucket.to_string() })
    }

    async fn consume(&self, spec: ConsumerSpec) -> Result<mpsc::Receiver<Delivery>, BusError> {
        let notify = {
            let mut state = self.state.lock();
            let stream = state
                .streams
                .get_mut(&spec.stream)
                .ok_or_else(|| BusError::Consumer(format!("unknown stream {}", spec.stream)))?;
            let consumer =
                stream.consumers.entry(spec.durable.clone()).or_insert_with(|| ConsumerState {
                    spec: spec.clone(),
                    notify: Arc::new(Notify::new()),
                    cursor: 1,
                    ready: VecDeque::new(),
                    inflight: HashSet::new(),
                    attempts: HashMap::new(),
                    done: HashSet::new(),
                });
            consumer.notify.clone()
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let bus = self.clone();
        let stream_name = spec.stream.clone();
        let durable = spec.durable.clone();
        let ack_wait = spec.ack_wait;
        tokio::spawn(async move {
            loop {
                let notified = notify.notified();
                if let Some((seq, message, attempt)) = bus.next_delivery(&stream_name, &durable) {
                    // Ack-wait watchdog: unresolved deliveries requeue.
                    {
                        let bus = bus.clone();
                        let stream_name = stream_name.clone();
                        let durable = durable.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(ack_wait).await;
                            bus.requeue(&stream_name, &durable, seq).await;
                        });
                    }
                    let delivery = Delivery::new(
                        message.subject,
                        message.payload,
                        message.headers,
                        attempt,
                        Box::new(MemoryAcker {
                            bus: bus.clone(),
                            stream: stream_name.clone(),
                            durable: durable.clone(),
                            seq,
                        }),
                    );
                    if tx.send(delivery).await.is_err() {
                        // Receiver gone (consumer restart): put it back.
                        bus.requeue(&stream_name, &durable, seq).await;
                        break;
                    }
                    continue;
                }
                notified.await;
            }
        });
        Ok(rx)
    }

    async fn stream_message(
        &self,
        stream: &str,
        seq: u64,
    ) -> Result<Option<(String, Bytes)>, BusError> {
        let state = self.state.lock();
        Ok(state
            .streams
            .get(stream)
            .and_then(|s| s.messages.get(&seq))
            .map(|m| (m.subject.clone(), m.payload.clone())))
    }

    async fn ping(&self) -> Result<BusHealth, BusError> {
        Ok(BusHealth {
            url: "memory://local".to_string(),
            server_version: "memory".to_string(),
            rtt: Duration::ZERO,
        })
    }

    async fn stream_stats(&self, stream: &str) -> Result<StreamStats, BusError> {
        let state = self.state.lock();
        let stream = state
            .streams
            .get(stream)
            .ok_or_else(|| BusError::Stream(format!("unknown stream {stream}")))?;
        Ok(StreamStats {
            messages: stream.messages.len() as u64,
            bytes: stream.messages.values().map(|m| m.payload.len() as u64).sum(),
            consumer_count: stream.consumers.len() as u64,
        })
    }

    async fn consumer_stats(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<ConsumerStats, BusError> {
        let state = self.state.lock();
        let stream = state
            .streams
            .get(stream)
            .ok_or_else(|| BusError::Stream(format!("unknown stream {stream}")))?;
        let consumer = stream
            .consumers
            .get(durable)
            .ok_or_else(|| BusError::Consumer(format!("unknown durable {durable}")))?;

        let undelivered = stream
            .messages
            .range(consumer.cursor..)
            .filter(|(seq, m)| {
                !consumer.done.contains(seq)
                    && !consumer.inflight.contains(seq)
                    && subject_matches(&consumer.spec.filter_subject, &m.subject)
            })
            .count() as u64;
        Ok(ConsumerStats {
            pending: undelivered + consumer.ready.len() as u64,
            ack_pending: consumer.inflight.len() as u64,
            redelivered: consumer.attempts.values().filter(|&&a| a > 1).count() as u64,
        })
    }
}

struct MemoryAcker {
    bus: MemoryBus,
    stream: String,
    durable: String,
    seq: u64,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), BusError> {
        self.bus.resolve(&self.stream, &self.durable, self.seq, true);
        Ok(())
    }

    async fn nak(&self, delay: Duration) -> Result<(), BusError> {
        let bus = self.bus.clone();
        let stream = self.stream.clone();
        let durable = self.durable.clone();
        let seq = self.seq;
        // The ack-wait watchdog and this delayed requeue race; requeue()
        // is idempotent via the inflight guard, so whichever fires first
        // wins and the other is a no-op.
        {
            let mut state = bus.state.lock();
            if let Some(s) = state.streams.get_mut(&stream) {
                if let Some(c) = s.consumers.get_mut(&durable) {
                    if !c.inflight.contains(&seq) {
                        return Ok(());
                    }
                }
            }
        }
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            bus.requeue(&stream, &durable, seq).await;
        });
        Ok(())
    }

    async fn term(&self) -> Result<(), BusError> {
        self.bus.resolve(&self.stream, &self.durable, self.seq, true);
        Ok(())
    }
}

struct MemoryKv {
    bus: MemoryBus,
    bucket: String,
}

impl MemoryKv {
    fn with_bucket<T>(
        &self,
        f: impl FnOnce(&mut KvState, Instant) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let mut state = self.bus.state.lock();
        let bucket = state
            .buckets
            .get_mut(&self.bucket)
            .ok_or_else(|| BusError::Kv(format!("bucket {:?} not ensured", self.bucket)))?;
        f(bucket, Instant::now())
    }
}

#[async_trait]
impl KvBucket for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, BusError> {
        self.with_bucket(|bucket, now| {
            Ok(bucket.live_entry(key, now).map(|e| KvEntry {
                key: key.to_string(),
                value: e.value.clone(),
                revision: e.revision,
            }))
        })
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<u64, BusError> {
        self.with_bucket(|bucket, now| {
            bucket.next_revision += 1;
            let revision = bucket.next_revision;
            let expires_at = bucket.ttl.map(|ttl| now + ttl);
            bucket.entries.insert(key.to_string(), MemEntry { value, revision, expires_at });
            Ok(revision)
        })
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<u64, BusError> {
        self.with_bucket(|bucket, now| {
            if bucket.live_entry(key, now).is_some() {
                return Err(BusError::Conflict { key: key.to_string(), expected: 0 });
            }
            bucket.next_revision += 1;
            let revision = bucket.next_revision;
            let expires_at = bucket.ttl.map(|ttl| now + ttl);
            bucket.entries.insert(key.to_string(), MemEntry { value, revision, expires_at });
            Ok(revision)
        })
    }

    async fn update(
        &self,
        key: &str,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<u64, BusError> {
        self.with_bucket(|bucket, now| {
            let current = bucket.live_entry(key, now).map(|e| e.revision);
            if current != Some(expected_revision) {
                return Err(BusError::Conflict {
                    key: key.to_string(),
                    expected: expected_revision,
                });
            }
            bucket.next_revision += 1;
            let revision = bucket.next_revision;
            let expires_at = bucket.ttl.map(|ttl| now + ttl);
            bucket.entries.insert(key.to_string(), MemEntry { value, revision, expires_at });
            Ok(revision)
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BusError> {
        self.with_bucket(|bucket, _| {
            bucket.entries.remove(key);
            Ok(())
        })
    }

    async fn keys(&self) -> Result<Vec<String>, BusError> {
        self.with_bucket(|bucket, now| {
            let mut keys: Vec<String> = bucket
                .entries
                .iter()
                .filter(|(_, e)| e.expires_at.is_none_or(|deadline| deadline > now))
                .map(|(k, _)| k.clone())
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    async fn stats(&self) -> Result<KvStats, BusError> {
        self.with_bucket(|bucket, now| {
            let entries = bucket
                .entries
                .values()
                .filter(|e| e.expires_at.is_none_or(|deadline| deadline > now))
                .count() as u64;
            Ok(KvStats { entries })
        })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
