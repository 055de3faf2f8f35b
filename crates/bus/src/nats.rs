// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JetStream implementation of the bus traits.

use crate::error::BusError;
use crate::traits::{
    Acker, BusHealth, ConsumerSpec, ConsumerStats, Delivery, InboundMessage, KvBucket, KvEntry,
    KvSpec, KvStats, MessageBus, StreamSpec, StreamStats,
};
use async_nats::jetstream::{self, consumer, kv, stream};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const DELIVERY_CHANNEL_CAPACITY: usize = 64;
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 256;

/// Bus backed by a NATS server with JetStream enabled.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    js: jetstream::Context,
    url: String,
    // Stores bound by ensure_kv; kv() hands out handles against these.
    stores: Arc<Mutex<HashMap<String, kv::Store>>>,
}

impl NatsBus {
    /// Connect to the broker at `url`.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .name("osapi")
            .connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        let js = jetstream::new(client.clone());
        Ok(Self { client, js, url: url.to_string(), stores: Arc::new(Mutex::new(HashMap::new())) })
    }

    fn store(&self, bucket: &str) -> Result<kv::Store, BusError> {
        self.stores
            .lock()
            .get(bucket)
            .cloned()
            .ok_or_else(|| BusError::Kv(format!("bucket {bucket:?} not ensured")))
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(name.as_str(), value.as_str());
    }
    map
}

fn header_vec(headers: Option<&HeaderMap>) -> Vec<(String, String)> {
    let Some(headers) = headers else {
        return Vec::new();
    };
    headers
        .iter()
        .filter_map(|(name, values)| {
            values
                .first()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(
        &self,
        subject: &str,
        headers: &[(String, String)],
        payload: Bytes,
    ) -> Result<(), BusError> {
        self.client
            .publish_with_headers(subject.to_string(), header_map(headers), payload)
            .await
            .map_err(|e| BusError::Publish { subject: subject.to_string(), reason: e.to_string() })
    }

    async fn publish_durable(
        &self,
        subject: &str,
        headers: &[(String, String)],
        payload: Bytes,
    ) -> Result<(), BusError> {
        let ack = self
            .js
            .publish_with_headers(subject.to_string(), header_map(headers), payload)
            .await
            .map_err(|e| BusError::Publish { subject: subject.to_string(), reason: e.to_string() })?;
        ack.await.map_err(|e| BusError::Publish {
            subject: subject.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<InboundMessage>, BusError> {
        let mut sub = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let inbound = InboundMessage {
                    subject: msg.subject.to_string(),
                    payload: msg.payload,
                    headers: header_vec(msg.headers.as_ref()),
                    reply: msg.reply.map(|r| r.to_string()),
                };
                if tx.send(inbound).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, BusError> {
        let fut = self.client.request(subject.to_string(), payload);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(msg)) => Ok(msg.payload),
            Ok(Err(e)) => {
                if e.to_string().contains("no responders") {
                    Err(BusError::NoResponders(subject.to_string()))
                } else {
                    Err(BusError::Publish {
                        subject: subject.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
            Err(_) => Err(BusError::Timeout { subject: subject.to_string(), timeout }),
        }
    }

    async fn ensure_stream(&self, spec: StreamSpec) -> Result<(), BusError> {
        let retention = if spec.work_queue {
            stream::RetentionPolicy::WorkQueue
        } else {
            stream::RetentionPolicy::Limits
        };
        self.js
            .get_or_create_stream(stream::Config {
                name: spec.name.clone(),
                subjects: spec.subjects.clone(),
                retention,
                storage: stream::StorageType::File,
                max_age: spec.max_age,
                duplicate_window: spec.duplicate_window,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Stream(format!("{}: {e}", spec.name)))?;
        tracing::debug!(stream = %spec.name, "stream ready");
        Ok(())
    }

    async fn ensure_kv(&self, spec: KvSpec) -> Result<(), BusError> {
        let store = match self.js.get_key_value(&spec.bucket).await {
            Ok(store) => store,
            Err(_) => self
                .js
                .create_key_value(kv::Config {
                    bucket: spec.bucket.clone(),
                    max_age: spec.ttl.unwrap_or_default(),
                    history: 1,
                    storage: stream::StorageType::File,
                    ..Default::default()
                })
                .await
                .map_err(|e| BusError::Kv(format!("{}: {e}", spec.bucket)))?,
        };
        self.stores.lock().insert(spec.bucket.clone(), store);
        tracing::debug!(bucket = %spec.bucket, "kv bucket ready");
        Ok(())
    }

    fn kv(&self, bucket: &str) -> Arc<dyn KvBucket> {
        Arc::new(NatsKv { bus: self.clone(), bucket: bucket.to_string() })
    }

    async fn consume(&self, spec: ConsumerSpec) -> Result<mpsc::Receiver<Delivery>, BusError> {
        let stream = self
            .js
            .get_stream(&spec.stream)
            .await
            .map_err(|e| BusError::Consumer(format!("stream {}: {e}", spec.stream)))?;
        let consumer = stream
            .get_or_create_consumer(
                &spec.durable,
                consumer::pull::Config {
                    durable_name: Some(spec.durable.clone()),
                    filter_subject: spec.filter_subject.clone(),
                    ack_policy: consumer::AckPolicy::Explicit,
                    max_deliver: spec.max_deliver,
                    ack_wait: spec.ack_wait,
                    max_ack_pending: spec.max_ack_pending,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Consumer(format!("durable {}: {e}", spec.durable)))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;

        let (tx, rx) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
        let durable = spec.durable.clone();
        tokio::spawn(async move {
            while let Some(next) = messages.next().await {
                let msg = match next {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(%durable, error = %e, "consumer pull failed");
                        continue;
                    }
                };
                let attempt = msg.info().map(|i| i.delivered.max(1) as u64).unwrap_or(1);
                let delivery = Delivery::new(
                    msg.subject.to_string(),
                    msg.payload.clone(),
                    header_vec(msg.headers.as_ref()),
                    attempt,
                    Box::new(NatsAcker { msg }),
                );
                if tx.send(delivery).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn stream_message(
        &self,
        stream: &str,
        seq: u64,
    ) -> Result<Option<(String, Bytes)>, BusError> {
        let stream = self
            .js
            .get_stream(stream)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        match stream.get_raw_message(seq).await {
            Ok(raw) => Ok(Some((raw.subject.to_string(), raw.payload.into()))),
            Err(_) => Ok(None),
        }
    }

    async fn ping(&self) -> Result<BusHealth, BusError> {
        let start = Instant::now();
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        let info = self.client.server_info();
        Ok(BusHealth {
            url: self.url.clone(),
            server_version: info.version.clone(),
            rtt: start.elapsed(),
        })
    }

    async fn stream_stats(&self, stream: &str) -> Result<StreamStats, BusError> {
        let mut stream = self
            .js
            .get_stream(stream)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        let info = stream
            .info()
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        Ok(StreamStats {
            messages: info.state.messages,
            bytes: info.state.bytes,
            consumer_count: info.state.consumer_count as u64,
        })
    }

    async fn consumer_stats(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<ConsumerStats, BusError> {
        let stream = self
            .js
            .get_stream(stream)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        let mut consumer: consumer::PullConsumer = stream
            .get_consumer(durable)
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;
        let info = consumer
            .info()
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;
        Ok(ConsumerStats {
            pending: info.num_pending,
            ack_pending: info.num_ack_pending as u64,
            redelivered: info.num_redelivered as u64,
        })
    }
}

struct NatsAcker {
    msg: jetstream::Message,
}

#[async_trait]
impl Acker for NatsAcker {
    async fn ack(&self) -> Result<(), BusError> {
        self.msg
            .ack()
            .await
            .map_err(|e| BusError::Consumer(format!("ack: {e}")))
    }

    async fn nak(&self, delay: Duration) -> Result<(), BusError> {
        self.msg
            .ack_with(jetstream::AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| BusError::Consumer(format!("nak: {e}")))
    }

    async fn term(&self) -> Result<(), BusError> {
        self.msg
            .ack_with(jetstream::AckKind::Term)
            .await
            .map_err(|e| BusError::Consumer(format!("term: {e}")))
    }
}

struct NatsKv {
    bus: NatsBus,
    bucket: String,
}

#[async_trait]
impl KvBucket for NatsKv {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, BusError> {
        let store = self.bus.store(&self.bucket)?;
        let entry = store
            .entry(key)
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        Ok(entry.and_then(|e| match e.operation {
            kv::Operation::Put => Some(KvEntry {
                key: e.key,
                value: e.value,
                revision: e.revision,
            }),
            kv::Operation::Delete | kv::Operation::Purge => None,
        }))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<u64, BusError> {
        let store = self.bus.store(&self.bucket)?;
        store
            .put(key, value)
            .await
            .map_err(|e| BusError::Kv(e.to_string()))
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<u64, BusError> {
        let store = self.bus.store(&self.bucket)?;
        store.create(key, value).await.map_err(|e| {
            if e.kind() == kv::CreateErrorKind::AlreadyExists {
                BusError::Conflict { key: key.to_string(), expected: 0 }
            } else {
                BusError::Kv(e.to_string())
            }
        })
    }

    async fn update(
        &self,
        key: &str,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<u64, BusError> {
        let store = self.bus.store(&self.bucket)?;
        store
            .update(key, value, expected_revision)
            .await
            .map_err(|e| {
                if e.kind() == kv::UpdateErrorKind::WrongLastRevision {
                    BusError::Conflict { key: key.to_string(), expected: expected_revision }
                } else {
                    BusError::Kv(e.to_string())
                }
            })
    }

    async fn delete(&self, key: &str) -> Result<(), BusError> {
        let store = self.bus.store(&self.bucket)?;
        store
            .purge(key)
            .await
            .map_err(|e| BusError::Kv(e.to_string()))
    }

    async fn keys(&self) -> Result<Vec<String>, BusError> {
        let store = self.bus.store(&self.bucket)?;
        let mut keys = store
            .keys()
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(key) = keys.next().await {
            match key {
                Ok(key) => out.push(key),
                Err(e) => return Err(BusError::Kv(e.to_string())),
            }
        }
        Ok(out)
    }

    async fn stats(&self) -> Result<KvStats, BusError> {
        let store = self.bus.store(&self.bucket)?;
        let status = store
            .status()
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        Ok(KvStats { entries: status.values() })
    }
}
