//! Typed view of the effective configuration used by `msk run`.
//!
//! ```yaml
//! dispatcher:
//!   name: "MAIN"            # default "dispatcher"
//!   poll_interval_ms: 1000  # default 1000, must be > 0
//! calendars:
//!   dir: "calendars"        # <id>.json calendar documents
//! bindings:
//!   - target: "AAA"
//!     calendar_id: 1
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const DEFAULT_DISPATCHER_NAME: &str = "dispatcher";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSection {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_name() -> String {
    DEFAULT_DISPATCHER_NAME.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarsSection {
    pub dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub target: String,
    pub calendar_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    pub calendars: CalendarsSection,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl DriverConfig {
    /// Deserialize from the merged config and validate everything that does
    /// not need the calendar store.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let cfg: DriverConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: driver config does not match the expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.poll_interval_ms == 0 {
            bail!("CONFIG_INVALID: dispatcher.poll_interval_ms must be > 0");
        }
        if self.dispatcher.name.trim().is_empty() {
            bail!("CONFIG_INVALID: dispatcher.name must not be blank");
        }
        if self.calendars.dir.trim().is_empty() {
            bail!("CONFIG_INVALID: calendars.dir must not be blank");
        }

        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (i, b) in self.bindings.iter().enumerate() {
            if b.target.trim().is_empty() {
                bail!("CONFIG_INVALID: bindings[{i}].target must not be blank");
            }
            if b.calendar_id <= 0 {
                bail!(
                    "CONFIG_INVALID: bindings[{i}].calendar_id must be positive (got {})",
                    b.calendar_id
                );
            }
            if !seen.insert(b.target.trim().to_uppercase()) {
                bail!("CONFIG_INVALID: duplicate binding target {:?}", b.target);
            }
        }
        Ok(())
    }

    /// Every binding must name a calendar that was loaded.
    pub fn check_bindings(&self, known_ids: &BTreeSet<i64>) -> Result<()> {
        for b in &self.bindings {
            if !known_ids.contains(&b.calendar_id) {
                bail!(
                    "CONFIG_INVALID: binding {:?} refers to unknown calendar id {}",
                    b.target,
                    b.calendar_id
                );
            }
        }
        Ok(())
    }

    /// `calendars.dir`, relative paths taken from `base`.
    pub fn calendars_dir(&self, base: &Path) -> PathBuf {
        let dir = Path::new(self.calendars.dir.trim());
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            base.join(dir)
        }
    }

    /// calendar id -> targets bound to it (config order).
    pub fn targets_by_calendar(&self) -> BTreeMap<i64, Vec<String>> {
        let mut out: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for b in &self.bindings {
            out.entry(b.calendar_id)
                .or_default()
                .push(b.target.trim().to_string());
        }
        out
    }
}
