// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus and KV traits every component programs against.

use crate::error::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A core (non-persisted) message received from a subscription.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Vec<(String, String)>,
    /// Reply-to inbox for request/reply exchanges.
    pub reply: Option<String>,
}

impl InboundMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A persisted message delivered from a durable consumer.
///
/// The handler must resolve every delivery exactly one way: [`ack`],
/// [`nak`] (redeliver after a delay), or [`term`] (permanent failure, no
/// redelivery). Dropping a delivery unresolved leaves it in-flight until
/// the consumer's ack-wait expires, after which the broker redelivers.
///
/// [`ack`]: Delivery::ack
/// [`nak`]: Delivery::nak
/// [`term`]: Delivery::term
pub struct Delivery {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Vec<(String, String)>,
    /// 1-based delivery attempt; > 1 means this is a redelivery.
    pub delivery_attempt: u64,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(
        subject: String,
        payload: Bytes,
        headers: Vec<(String, String)>,
        delivery_attempt: u64,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self { subject, payload, headers, delivery_attempt, acker }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub async fn ack(self) -> Result<(), BusError> {
        self.acker.ack().await
    }

    pub async fn nak(self, delay: Duration) -> Result<(), BusError> {
        self.acker.nak(delay).await
    }

    pub async fn term(self) -> Result<(), BusError> {
        self.acker.term().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("delivery_attempt", &self.delivery_attempt)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Resolution backend for one delivery.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<(), BusError>;
    async fn nak(&self, delay: Duration) -> Result<(), BusError>;
    async fn term(&self) -> Result<(), BusError>;
}

/// Stream to create idempotently at startup.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub name: String,
    pub subjects: Vec<String>,
    /// Work-queue retention: acked messages are removed.
    pub work_queue: bool,
    pub max_age: Duration,
    /// Publish dedup window for `Nats-Msg-Id`.
    pub duplicate_window: Duration,
}

/// KV bucket to create idempotently at startup.
#[derive(Debug, Clone)]
pub struct KvSpec {
    pub bucket: String,
    /// Per-key TTL; `None` keeps entries until deleted.
    pub ttl: Option<Duration>,
}

/// Durable consumer binding.
#[derive(Debug, Clone)]
pub struct ConsumerSpec {
    pub stream: String,
    /// Durable name. Instances sharing it share one delivery cursor,
    /// which is how the per-host agent queue group is realized.
    pub durable: String,
    pub filter_subject: String,
    pub max_deliver: i64,
    pub ack_wait: Duration,
    pub max_ack_pending: i64,
}

/// One KV entry with its revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Bytes,
    pub revision: u64,
}

/// Bucket size snapshot for the health view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvStats {
    pub entries: u64,
}

/// Broker connectivity snapshot.
#[derive(Debug, Clone)]
pub struct BusHealth {
    pub url: String,
    pub server_version: String,
    pub rtt: Duration,
}

/// Stream counters for the health view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub messages: u64,
    pub bytes: u64,
    pub consumer_count: u64,
}

/// Consumer counters for the health view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub pending: u64,
    pub ack_pending: u64,
    pub redelivered: u64,
}

/// A key-value bucket with per-key CAS.
#[async_trait]
pub trait KvBucket: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, BusError>;

    /// Unconditional write. Returns the new revision.
    async fn put(&self, key: &str, value: Bytes) -> Result<u64, BusError>;

    /// Create-only write; `Conflict` if the key already exists.
    async fn create(&self, key: &str, value: Bytes) -> Result<u64, BusError>;

    /// Compare-and-swap against `expected_revision`; `Conflict` if the
    /// key moved.
    async fn update(&self, key: &str, value: Bytes, expected_revision: u64)
        -> Result<u64, BusError>;

    async fn delete(&self, key: &str) -> Result<(), BusError>;

    async fn keys(&self) -> Result<Vec<String>, BusError>;

    async fn stats(&self) -> Result<KvStats, BusError>;
}

/// The message bus contract (modeled on JetStream semantics:
/// at-least-once delivery, per-subject FIFO, durable offsets).
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Fire-and-forget publish (responses, probe replies).
    async fn publish(
        &self,
        subject: &str,
        headers: &[(String, String)],
        payload: Bytes,
    ) -> Result<(), BusError>;

    /// Publish into a stream, awaiting the broker's storage ack.
    /// Errors if no stream captures the subject.
    async fn publish_durable(
        &self,
        subject: &str,
        headers: &[(String, String)],
        payload: Bytes,
    ) -> Result<(), BusError>;

    /// Core subscription (no durability): live messages only.
    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<InboundMessage>, BusError>;

    /// Single request/reply with a timeout.
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, BusError>;

    async fn ensure_stream(&self, spec: StreamSpec) -> Result<(), BusError>;

    async fn ensure_kv(&self, spec: KvSpec) -> Result<(), BusError>;

    /// Handle to a bucket previously ensured via [`ensure_kv`].
    ///
    /// [`ensure_kv`]: MessageBus::ensure_kv
    fn kv(&self, bucket: &str) -> Arc<dyn KvBucket>;

    /// Bind a durable consumer and stream its deliveries.
    async fn consume(&self, spec: ConsumerSpec) -> Result<mpsc::Receiver<Delivery>, BusError>;

    /// Fetch a stored message by stream sequence (DLQ advisory lookup).
    async fn stream_message(
        &self,
        stream: &str,
        seq: u64,
    ) -> Result<Option<(String, Bytes)>, BusError>;

    /// Round-trip connectivity probe.
    async fn ping(&self) -> Result<BusHealth, BusError>;

    async fn stream_stats(&self, stream: &str) -> Result<StreamStats, BusError>;

    async fn consumer_stats(&self, stream: &str, durable: &str)
        -> Result<ConsumerStats, BusError>;
}
