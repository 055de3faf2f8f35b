// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn job_id_display() {
    let id = JobId::new("a3c9e7c2-0000-4000-8000-000000000001");
    assert_eq!(id.to_string(), "a3c9e7c2-0000-4000-8000-000000000001");
}

#[test]
fn job_id_equality() {
    let id1 = JobId::new("job-1");
    let id2 = JobId::new("job-1");
    let id3 = JobId::new("job-2");

    assert_eq!(id1, id2);
    assert_ne!(id1, id3);
}

#[test]
fn job_id_serde_is_bare_string() {
    let id = JobId::new("my-job");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"my-job\"");

    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn uuid_gen_produces_canonical_uuids() {
    let gen = UuidIdGen;
    let id = gen.generate();
    assert_eq!(id.len(), 36);
    assert!(uuid::Uuid::parse_str(&id).is_ok());
    assert_eq!(id, id.to_lowercase());
}

#[test]
fn uuid_gen_is_unique() {
    let gen = UuidIdGen;
    assert_ne!(gen.generate(), gen.generate());
}

#[test]
fn seq_gen_counts_up() {
    let gen = SeqIdGen::new("job");
    assert_eq!(gen.generate(), "job-0000");
    assert_eq!(gen.generate(), "job-0001");
}
