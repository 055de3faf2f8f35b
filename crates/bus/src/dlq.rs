// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Max-deliveries advisory payload.
//!
//! When a message exhausts a consumer's max_deliver, the broker emits an
//! advisory on `$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.<stream>.<consumer>`;
//! the deployment's DLQ stream captures those. The advisory names the
//! stream sequence, not the message, so consumers of the DLQ resolve the
//! original envelope via [`MessageBus::stream_message`].
//!
//! [`MessageBus::stream_message`]: crate::traits::MessageBus::stream_message

use serde::{Deserialize, Serialize};

/// Advisory schema (subset we rely on).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxDeliverAdvisory {
    #[serde(rename = "type")]
    pub advisory_type: String,
    pub stream: String,
    pub consumer: String,
    pub stream_seq: u64,
    pub deliveries: u64,
}

impl MaxDeliverAdvisory {
    /// Advisory `type` value emitted by the broker.
    pub const TYPE: &'static str = "io.nats.jetstream.advisory.v1.max_deliver";

    pub fn new(stream: impl Into<String>, consumer: impl Into<String>, stream_seq: u64, deliveries: u64) -> Self {
        Self {
            advisory_type: Self::TYPE.to_string(),
            stream: stream.into(),
            consumer: consumer.into(),
            stream_seq,
            deliveries,
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
