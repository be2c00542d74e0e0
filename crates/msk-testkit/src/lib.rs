//! Shared fixtures for scenario tests.
//!
//! The reference calendar is "Exchange-A": Monday to Friday, state 1 at
//! 09:00 and state 0 at 17:00, UTC, nothing on weekends.
//!
//! Reference dates (2024):
//!   2024-03-04 Mon .. 2024-03-08 Fri  regular week
//!   2024-03-11 Mon                    next session after the weekend
//!   2024-12-25 Wed                    recurring holiday in fixtures

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use msk_calendar::{codec, Calendar, CalendarId, DaySchedule, Transition};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Parse an RFC 3339 instant. Panics on malformed fixture input.
pub fn utc(s: &str) -> DateTime<Utc> {
    s.parse()
        .unwrap_or_else(|e| panic!("bad UTC fixture {s:?}: {e}"))
}

/// Panics on an invalid fixture date.
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("bad date fixture {y}-{m}-{d}"))
}

/// Day schedule from `(hour, minute, state)` triples.
pub fn day(name: &str, slots: &[(u32, u32, i32)]) -> DaySchedule {
    DaySchedule::with_transitions(
        name,
        slots
            .iter()
            .filter_map(|(h, m, s)| Transition::at_hms(*h, *m, 0, *s)),
    )
}

/// 09:00 -> 1, 17:00 -> 0.
pub fn session() -> DaySchedule {
    day("session", &[(9, 0, 1), (17, 0, 0)])
}

/// A day with no transitions.
pub fn closed() -> DaySchedule {
    DaySchedule::new("closed")
}

/// 09:00 -> 1, 13:00 -> 0.
pub fn half_day() -> DaySchedule {
    day("half-day", &[(9, 0, 1), (13, 0, 0)])
}

pub fn exchange_a() -> Calendar {
    let cal = Calendar::new("Exchange-A");
    for d in WEEKDAYS {
        cal.add_day_schedule_for_weekday(d, session());
    }
    cal
}

/// Same weekly shape as [`exchange_a`] but bound to `tz`.
pub fn exchange_in(name: &str, tz: &str) -> Calendar {
    let cal = Calendar::new(name).with_timezone(tz);
    for d in WEEKDAYS {
        cal.add_day_schedule_for_weekday(d, session());
    }
    cal
}

/// Write `<id>.json` documents into a fresh temporary directory.
pub fn calendar_dir(calendars: &[(CalendarId, &Calendar)]) -> Result<TempDir> {
    let dir = tempfile::tempdir().context("create calendar dir")?;
    for (id, cal) in calendars {
        write_calendar(dir.path(), *id, cal)?;
    }
    Ok(dir)
}

pub fn write_calendar(dir: &Path, id: CalendarId, cal: &Calendar) -> Result<()> {
    let path = dir.join(format!("{id}.json"));
    fs::write(&path, codec::encode(cal)).with_context(|| format!("write {}", path.display()))
}
