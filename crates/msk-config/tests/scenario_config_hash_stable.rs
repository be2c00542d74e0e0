//! Config hash stability.
//!
//! GREEN when:
//! - the same inputs hash identically
//! - key order inside YAML does not change the hash
//! - different values hash differently
//! - overlays take effect and hash stably

use msk_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
dispatcher:
  name: "MAIN"
  poll_interval_ms: 1000
calendars:
  dir: "calendars"
bindings:
  - target: "AAA"
    calendar_id: 1
"#;

const BASE_YAML_REORDERED: &str = r#"
bindings:
  - calendar_id: 1
    target: "AAA"
calendars:
  dir: "calendars"
dispatcher:
  poll_interval_ms: 1000
  name: "MAIN"
"#;

const OVERLAY_YAML: &str = r#"
dispatcher:
  poll_interval_ms: 250
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        original.config_hash, reordered.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[&BASE_YAML.replace("AAA", "BBB")]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn merged_layers_produce_stable_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);

    let poll = a
        .config_json
        .pointer("/dispatcher/poll_interval_ms")
        .and_then(|v| v.as_u64())
        .unwrap();
    assert_eq!(poll, 250, "overlay should override base poll interval");
    let name = a
        .config_json
        .pointer("/dispatcher/name")
        .and_then(|v| v.as_str())
        .unwrap();
    assert_eq!(name, "MAIN", "overlay must keep sibling keys");
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}
