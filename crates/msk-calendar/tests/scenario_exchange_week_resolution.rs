//! Reference weekly calendar "Exchange-A".
//!
//!   UTC, Monday..Friday: 09:00 -> state 1, 17:00 -> state 0
//!
//!   2024-03-04 Mon  first session day of the week
//!   2024-03-08 Fri  last session day; weekend follows
//!   2024-03-11 Mon  next session

use chrono::{DateTime, Utc};
use msk_calendar::Calendar;
use msk_testkit::{exchange_a, utc};

fn next(cal: &Calendar, at: &str) -> (DateTime<Utc>, i32) {
    let tr = cal.resolve_next(utc(at)).unwrap();
    (tr.at_utc().unwrap(), tr.state())
}

#[test]
fn before_open_resolves_to_open() {
    let cal = exchange_a();
    assert_eq!(next(&cal, "2024-03-04T08:00:00Z"), (utc("2024-03-04T09:00:00Z"), 1));
}

#[test]
fn during_session_resolves_to_close() {
    let cal = exchange_a();
    assert_eq!(next(&cal, "2024-03-04T10:00:00Z"), (utc("2024-03-04T17:00:00Z"), 0));
}

#[test]
fn friday_evening_skips_the_weekend() {
    let cal = exchange_a();
    assert_eq!(next(&cal, "2024-03-08T18:00:00Z"), (utc("2024-03-11T09:00:00Z"), 1));
}

#[test]
fn next_is_strictly_after_the_query() {
    let cal = exchange_a();
    assert_eq!(next(&cal, "2024-03-04T09:00:00Z"), (utc("2024-03-04T17:00:00Z"), 0));
}

#[test]
fn saturday_resolves_to_monday() {
    let cal = exchange_a();
    assert_eq!(next(&cal, "2024-03-09T12:00:00Z"), (utc("2024-03-11T09:00:00Z"), 1));
    let prev = cal.resolve_previous(utc("2024-03-09T12:00:00Z")).unwrap();
    assert_eq!(prev.at_utc(), Some(utc("2024-03-08T17:00:00Z")));
}

#[test]
fn year_end_rollover() {
    let cal = exchange_a();
    // 2024-12-31 Tue after close -> 2025-01-01 Wed open.
    assert_eq!(next(&cal, "2024-12-31T18:00:00Z"), (utc("2025-01-01T09:00:00Z"), 1));
}

#[test]
fn untargeted_results_have_no_owner() {
    let cal = exchange_a();
    assert!(cal.resolve_next(utc("2024-03-04T08:00:00Z")).unwrap().owner().is_none());
}
