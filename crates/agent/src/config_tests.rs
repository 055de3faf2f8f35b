// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use std::io::Write;

fn clear_env() {
    for key in ["OSAPI_BUS_URL", "OSAPI_NAMESPACE", "OSAPI_HOSTNAME"] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_without_file_or_env() {
    clear_env();
    let config = AgentConfig::load(None).unwrap();

    assert_eq!(config.bus.url, "nats://127.0.0.1:4222");
    assert_eq!(config.bus.namespace, "osapi");
    assert_eq!(config.agent.max_jobs, 4);
    assert_eq!(config.consumer.max_deliver, 5);
    assert_eq!(config.registry_ttl(), Duration::from_secs(30));
    assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
    assert_eq!(
        config.backoff(),
        vec![
            Duration::from_secs(30),
            Duration::from_secs(120),
            Duration::from_secs(300),
            Duration::from_secs(900),
            Duration::from_secs(1800),
        ]
    );
}

#[test]
#[serial]
fn file_values_override_defaults() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[bus]
url = "nats://broker:4222"
namespace = "staging"

[agent]
hostname = "web-01"
max_jobs = 8
labels = {{ group = "web", env = "prod" }}

[consumer]
backoff_secs = [5, 10]

[registry]
ttl_secs = 60
"#
    )
    .unwrap();

    let config = AgentConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.bus.url, "nats://broker:4222");
    assert_eq!(config.bus.namespace, "staging");
    assert_eq!(config.agent.hostname.as_deref(), Some("web-01"));
    assert_eq!(config.agent.max_jobs, 8);
    assert_eq!(config.agent.labels.get("group").map(String::as_str), Some("web"));
    assert_eq!(config.backoff(), vec![Duration::from_secs(5), Duration::from_secs(10)]);
    assert_eq!(config.registry_ttl(), Duration::from_secs(60));
}

#[test]
#[serial]
fn env_overrides_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[bus]\nurl = \"nats://broker:4222\"").unwrap();

    std::env::set_var("OSAPI_BUS_URL", "nats://elsewhere:4222");
    std::env::set_var("OSAPI_HOSTNAME", "override-01");
    let config = AgentConfig::load(Some(file.path())).unwrap();
    clear_env();

    assert_eq!(config.bus.url, "nats://elsewhere:4222");
    assert_eq!(config.agent.hostname.as_deref(), Some("override-01"));
}

#[test]
#[serial]
fn unknown_keys_are_rejected() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[agent]\nworkers = 3").unwrap();

    assert!(matches!(
        AgentConfig::load(Some(file.path())),
        Err(ConfigError::Parse(_, _))
    ));
}

#[test]
#[serial]
fn missing_explicit_file_is_an_error() {
    clear_env();
    assert!(matches!(
        AgentConfig::load(Some(Path::new("/nonexistent/osapi.toml"))),
        Err(ConfigError::Read(_, _))
    ));
}
