// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn jobs_stream() -> StreamSpec {
    StreamSpec {
        name: "ns-jobs".to_string(),
        subjects: vec!["ns.jobs.>".to_string()],
        work_queue: true,
        max_age: Duration::from_secs(3600),
        duplicate_window: Duration::from_secs(120),
    }
}

fn agent_consumer(max_deliver: i64) -> ConsumerSpec {
    ConsumerSpec {
        stream: "ns-jobs".to_string(),
        durable: "job-agents-web-01".to_string(),
        filter_subject: "ns.jobs.web-01.>".to_string(),
        max_deliver,
        ack_wait: Duration::from_secs(30),
        max_ack_pending: 16,
    }
}

#[yare::parameterized(
    exact        = { "a.b.c", "a.b.c", true },
    star_token   = { "a.*.c", "a.b.c", true },
    star_miss    = { "a.*.c", "a.b.d", false },
    gt_tail      = { "a.>", "a.b.c.d", true },
    gt_needs_one = { "a.>", "a", false },
    shorter      = { "a.b", "a.b.c", false },
    longer       = { "a.b.c", "a.b", false },
)]
fn subject_matching(pattern: &str, subject: &str, expected: bool) {
    assert_eq!(subject_matches(pattern, subject), expected);
}

#[tokio::test]
async fn subscribe_receives_matching_publishes() {
    let bus = MemoryBus::new();
    let mut rx = bus.subscribe("ns.responses.>").await.unwrap();

    bus.publish("ns.responses.job-1.web-01", &[], Bytes::from_static(b"hi")).await.unwrap();
    bus.publish("ns.other", &[], Bytes::from_static(b"nope")).await.unwrap();

    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.subject, "ns.responses.job-1.web-01");
    assert_eq!(msg.payload, Bytes::from_static(b"hi"));
}

#[tokio::test]
async fn publish_durable_requires_a_capturing_stream() {
    let bus = MemoryBus::new();
    let err = bus
        .publish_durable("ns.jobs.web-01.system.hostname", &[], Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Publish { .. }));

    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.system.hostname", &[], Bytes::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn consume_delivers_and_ack_removes_from_work_queue() {
    let bus = MemoryBus::new();
    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.system.hostname", &[("h".into(), "v".into())], Bytes::from_static(b"payload"))
        .await
        .unwrap();

    let mut deliveries = bus.consume(agent_consumer(5)).await.unwrap();
    let delivery = deliveries.recv().await.unwrap();
    assert_eq!(delivery.subject, "ns.jobs.web-01.system.hostname");
    assert_eq!(delivery.delivery_attempt, 1);
    assert_eq!(delivery.header("h"), Some("v"));
    delivery.ack().await.unwrap();

    let stats = bus.stream_stats("ns-jobs").await.unwrap();
    assert_eq!(stats.messages, 0);
}

#[tokio::test]
async fn consumer_filter_skips_other_hosts() {
    let bus = MemoryBus::new();
    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.publish_durable("ns.jobs.web-02.system.hostname", &[], Bytes::new()).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.system.hostname", &[], Bytes::new()).await.unwrap();

    let mut deliveries = bus.consume(agent_consumer(5)).await.unwrap();
    let delivery = deliveries.recv().await.unwrap();
    assert_eq!(delivery.subject, "ns.jobs.web-01.system.hostname");
}

#[tokio::test(start_paused = true)]
async fn nak_redelivers_after_delay_with_bumped_attempt() {
    let bus = MemoryBus::new();
    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.system.hostname", &[], Bytes::new()).await.unwrap();

    let mut deliveries = bus.consume(agent_consumer(5)).await.unwrap();
    let first = deliveries.recv().await.unwrap();
    assert_eq!(first.delivery_attempt, 1);
    first.nak(Duration::from_secs(30)).await.unwrap();

    let second = deliveries.recv().await.unwrap();
    assert_eq!(second.delivery_attempt, 2);
    second.ack().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unresolved_delivery_redelivers_after_ack_wait() {
    let bus = MemoryBus::new();
    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.system.hostname", &[], Bytes::new()).await.unwrap();

    let mut deliveries = bus.consume(agent_consumer(5)).await.unwrap();
    let first = deliveries.recv().await.unwrap();
    drop(first); // simulated crash: never resolved

    let second = deliveries.recv().await.unwrap();
    assert_eq!(second.delivery_attempt, 2);
}

#[tokio::test(start_paused = true)]
async fn max_deliver_exhaustion_emits_dlq_advisory() {
    let bus = MemoryBus::new();
    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.ensure_stream(StreamSpec {
        name: "ns-dlq".to_string(),
        subjects: vec!["$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.ns-jobs.*".to_string()],
        work_queue: false,
        max_age: Duration::from_secs(3600),
        duplicate_window: Duration::ZERO,
    })
    .await
    .unwrap();
    bus.publish_durable("ns.jobs.web-01.system.hostname", &[], Bytes::from_static(b"doomed"))
        .await
        .unwrap();

    let mut deliveries = bus.consume(agent_consumer(2)).await.unwrap();
    for attempt in 1..=2u64 {
        let delivery = deliveries.recv().await.unwrap();
        assert_eq!(delivery.delivery_attempt, attempt);
        delivery.nak(Duration::from_secs(1)).await.unwrap();
    }

    // Third redelivery never happens; the advisory lands on the DLQ stream.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let dlq = bus.stream_stats("ns-dlq").await.unwrap();
    assert_eq!(dlq.messages, 1);

    let (subject, payload) = bus.stream_message("ns-dlq", 1).await.unwrap().unwrap();
    assert!(subject.ends_with("MAX_DELIVERIES.ns-jobs.job-agents-web-01"));
    let advisory = MaxDeliverAdvisory::parse(&payload).unwrap();
    assert_eq!(advisory.stream_seq, 1);
    assert_eq!(advisory.deliveries, 2);

    // The original message is still resolvable for DLQ handling.
    let (orig_subject, orig_payload) =
        bus.stream_message("ns-jobs", advisory.stream_seq).await.unwrap().unwrap();
    assert_eq!(orig_subject, "ns.jobs.web-01.system.hostname");
    assert_eq!(orig_payload, Bytes::from_static(b"doomed"));
}

#[tokio::test]
async fn restart_with_same_durable_resumes_cursor() {
    let bus = MemoryBus::new();
    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.a.b", &[], Bytes::from_static(b"1")).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.a.b", &[], Bytes::from_static(b"2")).await.unwrap();

    let mut first = bus.consume(agent_consumer(5)).await.unwrap();
    let delivery = first.recv().await.unwrap();
    assert_eq!(delivery.payload, Bytes::from_static(b"1"));
    delivery.ack().await.unwrap();
    drop(first);

    let mut second = bus.consume(agent_consumer(5)).await.unwrap();
    let delivery = second.recv().await.unwrap();
    assert_eq!(delivery.payload, Bytes::from_static(b"2"));
}

#[tokio::test]
async fn request_without_listener_reports_no_responders() {
    let bus = MemoryBus::new();
    let err = bus
        .request("ns.registry.web-01", Bytes::new(), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::NoResponders(_)));
}

#[tokio::test]
async fn request_reply_roundtrip() {
    let bus = MemoryBus::new();
    let mut probe = bus.subscribe("ns.registry.web-01").await.unwrap();

    let responder = {
        let bus = bus.clone();
        tokio::spawn(async move {
            let msg = probe.recv().await.unwrap();
            let reply = msg.reply.unwrap();
            bus.publish(&reply, &[], Bytes::from_static(b"pong")).await.unwrap();
        })
    };

    let reply = bus
        .request("ns.registry.web-01", Bytes::from_static(b"ping"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, Bytes::from_static(b"pong"));
    responder.await.unwrap();
}

#[tokio::test]
async fn kv_put_get_bumps_revisions() {
    let bus = MemoryBus::new();
    bus.ensure_kv(KvSpec { bucket: "ns-jobs".to_string(), ttl: None }).await.unwrap();
    let kv = bus.kv("ns-jobs");

    let r1 = kv.put("job-1", Bytes::from_static(b"a")).await.unwrap();
    let r2 = kv.put("job-1", Bytes::from_static(b"b")).await.unwrap();
    assert!(r2 > r1);

    let entry = kv.get("job-1").await.unwrap().unwrap();
    assert_eq!(entry.value, Bytes::from_static(b"b"));
    assert_eq!(entry.revision, r2);
}

#[tokio::test]
async fn kv_create_conflicts_on_existing_key() {
    let bus = MemoryBus::new();
    bus.ensure_kv(KvSpec { bucket: "b".to_string(), ttl: None }).await.unwrap();
    let kv = bus.kv("b");

    kv.create("k", Bytes::from_static(b"v")).await.unwrap();
    let err = kv.create("k", Bytes::from_static(b"v2")).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn kv_update_is_compare_and_swap() {
    let bus = MemoryBus::new();
    bus.ensure_kv(KvSpec { bucket: "b".to_string(), ttl: None }).await.unwrap();
    let kv = bus.kv("b");

    let r1 = kv.create("k", Bytes::from_static(b"v1")).await.unwrap();
    let r2 = kv.update("k", Bytes::from_static(b"v2"), r1).await.unwrap();
    assert!(r2 > r1);

    // Losing writer retries against the stale revision.
    let err = kv.update("k", Bytes::from_static(b"v3"), r1).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test(start_paused = true)]
async fn kv_entries_expire_after_ttl() {
    let bus = MemoryBus::new();
    bus.ensure_kv(KvSpec {
        bucket: "ns-worker-registry".to_string(),
        ttl: Some(Duration::from_secs(30)),
    })
    .await
    .unwrap();
    let kv = bus.kv("ns-worker-registry");

    kv.put("web-01", Bytes::from_static(b"{}")).await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(kv.get("web-01").await.unwrap().is_some());

    // A heartbeat rewrite extends the deadline.
    kv.put("web-01", Bytes::from_static(b"{}")).await.unwrap();
    tokio::time::advance(Duration::from_secs(25)).await;
    assert!(kv.get("web-01").await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(kv.get("web-01").await.unwrap().is_none());
    assert!(kv.keys().await.unwrap().is_empty());
    assert_eq!(kv.stats().await.unwrap().entries, 0);
}

#[tokio::test]
async fn kv_delete_removes_key() {
    let bus = MemoryBus::new();
    bus.ensure_kv(KvSpec { bucket: "b".to_string(), ttl: None }).await.unwrap();
    let kv = bus.kv("b");

    kv.put("k", Bytes::from_static(b"v")).await.unwrap();
    kv.delete("k").await.unwrap();
    assert!(kv.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn consumer_stats_track_inflight_and_redeliveries() {
    let bus = MemoryBus::new();
    bus.ensure_stream(jobs_stream()).await.unwrap();
    bus.publish_durable("ns.jobs.web-01.a.b", &[], Bytes::new()).await.unwrap();

    let mut deliveries = bus.consume(agent_consumer(5)).await.unwrap();
    let held = deliveries.recv().await.unwrap();

    let stats = bus.consumer_stats("ns-jobs", "job-agents-web-01").await.unwrap();
    assert_eq!(stats.ack_pending, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.redelivered, 0);

    held.nak(Duration::ZERO).await.unwrap();
    let redelivered = deliveries.recv().await.unwrap();
    assert_eq!(redelivered.delivery_attempt, 2);

    let stats = bus.consumer_stats("ns-jobs", "job-agents-web-01").await.unwrap();
    assert_eq!(stats.redelivered, 1);
    redelivered.ack().await.unwrap();
}
