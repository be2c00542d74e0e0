//! Calendar store: a directory of `<id>.json` documents.

use anyhow::{Context, Result};
use msk_calendar::{CalendarId, CalendarRegistry};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Insert every `<positive id>.json` document under `dir` into `registry`.
/// Other file names are skipped; a document that fails to decode fails the
/// whole load.
pub fn load_dir(registry: &CalendarRegistry, dir: &Path) -> Result<usize> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("read calendar dir: {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut loaded = 0usize;
    for path in paths {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|id| *id > 0);
        let Some(id) = id else {
            warn!(path = %path.display(), "calendar file name is not a positive id; skipped");
            continue;
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read calendar: {}", path.display()))?;
        registry
            .insert_encoded(CalendarId(id), &raw)
            .with_context(|| format!("decode calendar: {}", path.display()))?;
        loaded += 1;
    }

    info!(dir = %dir.display(), count = loaded, "calendar store loaded");
    Ok(loaded)
}
