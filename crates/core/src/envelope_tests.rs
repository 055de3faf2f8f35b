// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn envelope() -> JobEnvelope {
    let op = Operation::new("system.hostname").unwrap();
    JobEnvelope::new(JobId::new("job-1"), op, Hostname::new("web-01"), 1_000)
}

#[test]
fn parse_roundtrips() {
    let bytes = serde_json::to_vec(&envelope()).unwrap();
    let parsed = JobEnvelope::parse(&bytes).unwrap();
    assert_eq!(parsed, envelope());
}

#[test]
fn parse_rejects_non_json() {
    assert!(matches!(JobEnvelope::parse(b"not json"), Err(EnvelopeError::Json(_))));
}

#[test]
fn parse_rejects_malformed_operation_type() {
    let raw = br#"{"job_id":"job-1","operation":{"type":"NOPE"},"target":"web-01","enqueued_at_ms":1}"#;
    assert!(matches!(JobEnvelope::parse(raw), Err(EnvelopeError::Operation(_))));
}

#[test]
fn msg_id_combines_job_and_host() {
    assert_eq!(envelope().msg_id(), "job-1-web-01");
}
