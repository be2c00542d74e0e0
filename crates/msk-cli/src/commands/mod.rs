//! Command handler modules for msk.
//!
//! Shared utilities used by multiple command paths live here.

pub mod check;
pub mod resolve;
pub mod run;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use msk_config::{ConfigMode, DriverConfig, LoadedConfig, UnusedKeyPolicy};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub fn parse_utc(raw: &str, flag: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{flag} must be an RFC 3339 instant, got {raw:?}"))
}

/// Load layered config, run the unused-key guard for `mode` and build the
/// typed driver view.
pub fn load_driver_config(
    config_paths: &[String],
    mode: ConfigMode,
    strict_keys: bool,
) -> Result<(LoadedConfig, DriverConfig)> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = msk_config::load_layered_yaml(&path_refs)?;

    let policy = if strict_keys {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = msk_config::report_unused_keys(mode, &loaded.config_json, policy)?;
    for ptr in &report.unused_leaf_pointers {
        warn!(mode = %report.mode, key = %ptr, "config key not read in this mode");
    }

    let cfg = DriverConfig::from_config_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, mode = %report.mode, "config loaded");
    Ok((loaded, cfg))
}

/// Relative `calendars.dir` is taken from the directory of the first config
/// layer.
pub fn config_base(config_paths: &[String]) -> PathBuf {
    config_paths
        .first()
        .and_then(|p| Path::new(p).parent())
        .map(Path::to_path_buf)
        .unwrap_or_default()
}
