// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! osapi-bus: message bus abstraction for the osapi control plane.
//!
//! Components program against [`MessageBus`] and [`KvBucket`]; the
//! production implementation is [`NatsBus`] over JetStream. Tests use the
//! in-memory [`MemoryBus`] (behind the `test-support` feature), which
//! emulates the contract this crate requires of the broker: at-least-once
//! delivery, per-subject FIFO, durable offsets, redelivery with
//! max-deliver DLQ advisories, and KV buckets with per-key CAS and TTL.

pub mod dlq;
pub mod error;
pub mod nats;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use dlq::MaxDeliverAdvisory;
pub use error::BusError;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryBus;
pub use nats::NatsBus;
pub use traits::{
    Acker, BusHealth, ConsumerSpec, ConsumerStats, Delivery, InboundMessage, KvBucket, KvEntry,
    KvSpec, KvStats, MessageBus, StreamSpec, StreamStats,
};
