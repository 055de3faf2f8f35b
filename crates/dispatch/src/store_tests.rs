// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use osapi_bus::{KvSpec, MemoryBus};
use osapi_core::{FakeClock, JobBuilder, TimelineEvent, WorkerState};

async fn store() -> (JobStore<FakeClock>, FakeClock) {
    let bus = MemoryBus::new();
    let ns = Namespace::new("osapi").unwrap();
    bus.ensure_kv(KvSpec { bucket: ns.jobs_bucket(), ttl: None }).await.unwrap();
    let clock = FakeClock::new();
    (JobStore::new(&bus, &ns, clock.clone()), clock)
}

#[tokio::test]
async fn create_then_get_roundtrips() {
    let (store, _) = store().await;
    let job = JobBuilder::default().id("job-1").build();

    let revision = store.create(&job).await.unwrap();
    let (loaded, loaded_revision) = store.get(&"job-1".into()).await.unwrap().unwrap();

    assert_eq!(loaded, job);
    assert_eq!(loaded_revision, revision);
}

#[tokio::test]
async fn create_rejects_duplicate_id() {
    let (store, _) = store().await;
    let job = JobBuilder::default().id("job-1").build();

    store.create(&job).await.unwrap();
    assert!(store.create(&job).await.is_err());
}

#[tokio::test]
async fn get_missing_returns_none() {
    let (store, _) = store().await;
    assert!(store.get(&"nope".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let (store, _) = store().await;
    assert!(matches!(
        store.delete(&"nope".into()).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn mutate_applies_and_bumps_revision() {
    let (store, clock) = store().await;
    let job = JobBuilder::default().id("job-1").hosts(["web-01"]).build();
    let r0 = store.create(&job).await.unwrap();

    clock.set_epoch_ms(2_000);
    let (updated, r1) = store
        .mutate(&"job-1".into(), |job, now| {
            job.apply_worker_state(&"web-01".into(), WorkerState::started(now), now)
        })
        .await
        .unwrap();

    assert!(r1 > r0);
    assert_eq!(updated.worker_states.len(), 1);
    assert_eq!(updated.updated_at_ms, 2_000);
}

#[tokio::test]
async fn mutate_skips_write_when_nothing_changed() {
    let (store, _) = store().await;
    let job = JobBuilder::default().id("job-1").build();
    let r0 = store.create(&job).await.unwrap();

    let (_, revision) = store.mutate(&"job-1".into(), |_, _| false).await.unwrap();
    assert_eq!(revision, r0);
}

#[tokio::test]
async fn mutate_missing_is_not_found() {
    let (store, _) = store().await;
    assert!(matches!(
        store.mutate(&"nope".into(), |_, _| true).await,
        Err(StoreError::NotFound(_))
    ));
}

// Two concurrent writers: exactly one CAS attempt wins per revision, the
// loser re-reads and lands on top. Both updates survive.
#[tokio::test]
async fn concurrent_mutates_both_land() {
    let (store, _) = store().await;
    let job = JobBuilder::default().id("job-1").hosts(["web-01", "web-02"]).build();
    store.create(&job).await.unwrap();

    let a = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .mutate(&"job-1".into(), |job, now| {
                    job.apply_worker_state(&"web-01".into(), WorkerState::started(now), now)
                })
                .await
        })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .mutate(&"job-1".into(), |job, now| {
                    job.apply_worker_state(&"web-02".into(), WorkerState::started(now), now)
                })
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let (final_job, _) = store.get(&"job-1".into()).await.unwrap().unwrap();
    assert_eq!(final_job.worker_states.len(), 2);
}

// A record past the bucket TTL reads back as absent, which the
// dispatcher surfaces as not-found.
#[tokio::test(start_paused = true)]
async fn records_expire_with_the_bucket_ttl() {
    let bus = MemoryBus::new();
    let ns = Namespace::new("osapi").unwrap();
    bus.ensure_kv(KvSpec {
        bucket: ns.jobs_bucket(),
        ttl: Some(std::time::Duration::from_secs(60)),
    })
    .await
    .unwrap();
    let store = JobStore::new(&bus, &ns, FakeClock::new());

    let job = JobBuilder::default().id("job-1").build();
    store.create(&job).await.unwrap();
    assert!(store.get(&"job-1".into()).await.unwrap().is_some());

    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    assert!(store.get(&"job-1".into()).await.unwrap().is_none());
    assert!(matches!(
        store.delete(&"job-1".into()).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn mutate_timeline_entries_accumulate() {
    let (store, clock) = store().await;
    let job = JobBuilder::default().id("job-1").hosts(["web-01"]).build();
    store.create(&job).await.unwrap();

    clock.set_epoch_ms(3_000);
    let (updated, _) = store
        .mutate(&"job-1".into(), |job, now| {
            job.append_timeline(
                TimelineEvent::Dispatched,
                Some(&"web-01".into()),
                "",
                None,
                now,
            );
            true
        })
        .await
        .unwrap();

    assert_eq!(updated.timeline.len(), 2); // created + dispatched
    assert_eq!(updated.timeline[1].event, TimelineEvent::Dispatched);
}
