//! Typed driver config validation.

use msk_config::{load_layered_yaml_from_strings, DriverConfig};
use std::collections::BTreeSet;

fn driver(yaml: &str) -> anyhow::Result<DriverConfig> {
    let loaded = load_layered_yaml_from_strings(&[yaml])?;
    DriverConfig::from_config_json(&loaded.config_json)
}

#[test]
fn full_config_parses() {
    let cfg = driver(
        r#"
dispatcher:
  name: "MAIN"
  poll_interval_ms: 200
calendars:
  dir: "cal"
bindings:
  - target: "AAA"
    calendar_id: 1
  - target: "BBB"
    calendar_id: 2
"#,
    )
    .unwrap();
    assert_eq!(cfg.dispatcher.name, "MAIN");
    assert_eq!(cfg.dispatcher.poll_interval_ms, 200);
    assert_eq!(cfg.bindings.len(), 2);

    let known: BTreeSet<i64> = [1, 2].into_iter().collect();
    cfg.check_bindings(&known).unwrap();
    let partial: BTreeSet<i64> = [1].into_iter().collect();
    let err = cfg.check_bindings(&partial).unwrap_err();
    assert!(err.to_string().contains("unknown calendar id 2"));
}

#[test]
fn zero_poll_interval_is_rejected() {
    let err = driver("dispatcher: {poll_interval_ms: 0}\ncalendars: {dir: cal}").unwrap_err();
    assert!(err.to_string().contains("poll_interval_ms"));
}

#[test]
fn duplicate_targets_are_rejected_case_insensitively() {
    let err = driver(
        r#"
calendars: {dir: cal}
bindings:
  - {target: "aaa", calendar_id: 1}
  - {target: "AAA", calendar_id: 2}
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("duplicate binding target"));
}

#[test]
fn non_positive_calendar_id_is_rejected() {
    assert!(driver("calendars: {dir: cal}\nbindings: [{target: X, calendar_id: 0}]").is_err());
}

#[test]
fn missing_calendar_store_is_rejected() {
    assert!(driver("dispatcher: {name: MAIN}").is_err());
}
