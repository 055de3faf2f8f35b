// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    plain      = { "web-01" },
    underscore = { "db_primary" },
    digits     = { "node7" },
    mixed_case = { "Edge-GW-2" },
)]
fn parse_accepts_token_safe_names(name: &str) {
    let host = Hostname::parse(name).unwrap();
    assert_eq!(host.as_str(), name);
}

#[yare::parameterized(
    empty    = { "", HostnameError::Empty },
    dotted   = { "web.example.com", HostnameError::InvalidCharacter("web.example.com".into()) },
    space    = { "web 01", HostnameError::InvalidCharacter("web 01".into()) },
    wildcard = { "web-*", HostnameError::InvalidCharacter("web-*".into()) },
    gt       = { ">", HostnameError::InvalidCharacter(">".into()) },
)]
fn parse_rejects_subject_unsafe_names(name: &str, expected: HostnameError) {
    assert_eq!(Hostname::parse(name).unwrap_err(), expected);
}

#[test]
fn hostname_orders_lexicographically() {
    let mut hosts = vec![Hostname::new("web-02"), Hostname::new("db-01"), Hostname::new("web-01")];
    hosts.sort();
    assert_eq!(
        hosts,
        vec![Hostname::new("db-01"), Hostname::new("web-01"), Hostname::new("web-02")]
    );
}

#[test]
fn hostname_borrows_as_str_for_map_lookup() {
    use std::collections::BTreeMap;
    let mut map: BTreeMap<Hostname, u32> = BTreeMap::new();
    map.insert(Hostname::new("web-01"), 1);
    assert_eq!(map.get("web-01"), Some(&1));
}
