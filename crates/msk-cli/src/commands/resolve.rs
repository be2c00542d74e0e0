use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use msk_calendar::{codec, Calendar, CalendarId, CalendarRegistry};
use msk_config::ConfigMode;
use std::fs;
use tracing::debug;

use crate::store;

pub enum Source {
    File(String),
    Store { config_paths: Vec<String>, id: i64 },
}

pub struct ResolveArgs {
    pub source: Source,
    pub at: DateTime<Utc>,
    pub count: usize,
    pub backward: bool,
    pub target: Option<String>,
}

fn load_calendar(source: &Source) -> Result<Calendar> {
    match source {
        Source::File(file) => {
            let raw = fs::read_to_string(file).with_context(|| format!("read calendar: {file}"))?;
            codec::decode(&raw).with_context(|| format!("decode calendar: {file}"))
        }
        Source::Store { config_paths, id } => {
            let (_, cfg) = super::load_driver_config(config_paths, ConfigMode::Resolve, false)?;
            let registry = CalendarRegistry::new();
            store::load_dir(&registry, &cfg.calendars_dir(&super::config_base(config_paths)))?;
            registry
                .master_copy(CalendarId(*id))
                .with_context(|| format!("calendar id {id} not found in store"))
        }
    }
}

pub fn resolve(args: ResolveArgs) -> Result<()> {
    let mut cal = load_calendar(&args.source)?;
    if let Some(target) = args.target.as_deref().filter(|t| !t.trim().is_empty()) {
        cal = cal.targeted_copy(target);
    }

    let mut at = args.at;
    for _ in 0..args.count {
        let found = if args.backward {
            cal.resolve_previous(at)
        } else {
            cal.resolve_next(at)
        };
        let Some(tr) = found else {
            debug!(calendar = %cal.key(), at = %at, "no further transition");
            break;
        };
        println!("{}", codec::encode_transition(&tr));

        let Some(t) = tr.at_utc() else { break };
        // Previous is at-or-before: step just below the hit to move on.
        at = if args.backward {
            t - Duration::nanoseconds(1)
        } else {
            t
        };
    }
    Ok(())
}
