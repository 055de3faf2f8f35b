// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn ns() -> Namespace {
    Namespace::new("osapi").unwrap()
}

#[test]
fn job_subject_embeds_host_and_dotted_type() {
    let subject = ns().jobs_subject(&Hostname::new("web-01"), "network.dns.update");
    assert_eq!(subject, "osapi.jobs.web-01.network.dns.update");
}

#[test]
fn agent_filter_captures_every_operation_for_the_host() {
    assert_eq!(ns().agent_filter(&Hostname::new("web-01")), "osapi.jobs.web-01.>");
    assert_eq!(ns().jobs_wildcard(), "osapi.jobs.>");
}

#[test]
fn response_subjects_scope_by_job_then_host() {
    let subject = ns().responses_subject(&JobId::new("1f0d"), &Hostname::new("web-01"));
    assert_eq!(subject, "osapi.responses.1f0d.web-01");
    assert_eq!(ns().responses_wildcard(), "osapi.responses.>");
}

#[test]
fn bucket_names_are_namespace_prefixed() {
    let ns = ns();
    assert_eq!(ns.jobs_bucket(), "osapi-jobs");
    assert_eq!(ns.responses_bucket(), "osapi-responses");
    assert_eq!(ns.registry_bucket(), "osapi-worker-registry");
    assert_eq!(ns.audit_bucket(), "osapi-audit-log");
}

#[test]
fn dlq_advisory_targets_the_jobs_stream() {
    assert_eq!(
        ns().dlq_advisory_subject(),
        "$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.osapi-jobs.*"
    );
    assert_eq!(ns().dlq_stream(), "osapi-dlq");
}

#[test]
fn agent_durable_is_per_host_within_one_queue_group() {
    assert_eq!(ns().agent_durable(&Hostname::new("web-01")), "job-agents-web-01");
    assert_eq!(AGENT_QUEUE_GROUP, "job-agents");
}

#[yare::parameterized(
    empty     = { "" },
    dotted    = { "prod.eu" },
    uppercase = { "Prod" },
    spaced    = { "prod eu" },
)]
fn namespace_rejects_token_unsafe_input(input: &str) {
    assert!(Namespace::new(input).is_err());
}

#[test]
fn namespace_serde_validates() {
    let ns: Namespace = serde_json::from_str("\"staging\"").unwrap();
    assert_eq!(ns.as_str(), "staging");
    assert!(serde_json::from_str::<Namespace>("\"bad.ns\"").is_err());
}
