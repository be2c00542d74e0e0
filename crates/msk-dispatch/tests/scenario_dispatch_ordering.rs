//! Queue ordering: time first, then target label compared case-insensitively.

use chrono::Weekday;
use msk_calendar::{CalendarId, CalendarRegistry};
use msk_dispatch::Dispatcher;
use msk_testkit::{day, exchange_a, exchange_in, utc};
use std::sync::Arc;

#[test]
fn same_instant_ties_break_on_target() {
    let reg = CalendarRegistry::new();
    reg.insert(CalendarId(1), exchange_a());
    let d = Dispatcher::new("MAIN");
    let now = utc("2024-03-04T08:00:00Z");
    for target in ["ccc", "AAA", "bbb"] {
        let inst = reg.targeted_copy(CalendarId(1), target).unwrap();
        assert!(d.register(Arc::new(inst), now));
    }

    let owners: Vec<String> = d
        .pending_snapshot()
        .iter()
        .map(|t| t.owner().unwrap().to_string())
        .collect();
    assert_eq!(owners, vec!["AAA", "bbb", "ccc"]);

    let due = utc("2024-03-04T09:00:00Z");
    let mut popped = Vec::new();
    while let Some(tr) = d.get_triggered(due) {
        popped.push(tr.owner().unwrap().to_string());
    }
    assert_eq!(popped, vec!["AAA", "bbb", "ccc"]);
}

#[test]
fn earlier_time_wins_over_target_order() {
    let reg = CalendarRegistry::new();
    reg.insert(CalendarId(1), exchange_a());
    // Same session shape one hour ahead of UTC: opens at 08:00Z.
    reg.insert(CalendarId(2), exchange_in("Exchange-B", "Europe/Paris"));

    let d = Dispatcher::new("MAIN");
    let now = utc("2024-03-04T07:00:00Z");
    d.register(Arc::new(reg.targeted_copy(CalendarId(1), "AAA").unwrap()), now);
    d.register(Arc::new(reg.targeted_copy(CalendarId(2), "ZZZ").unwrap()), now);

    let first = d.get_triggered(utc("2024-03-04T12:00:00Z")).unwrap();
    assert_eq!(first.owner(), Some("ZZZ"));
    assert_eq!(first.at_utc(), Some(utc("2024-03-04T08:00:00Z")));
    let second = d.get_triggered(utc("2024-03-04T12:00:00Z")).unwrap();
    assert_eq!(second.owner(), Some("AAA"));
}

#[test]
fn pending_times_are_totally_ordered() {
    let reg = CalendarRegistry::new();
    let cal = exchange_a();
    cal.add_day_schedule_for_weekday(Weekday::Sat, day("sat", &[(9, 0, 1)]));
    reg.insert(CalendarId(1), cal);

    let d = Dispatcher::new("MAIN");
    let now = utc("2024-03-04T08:00:00Z");
    for t in ["d", "b", "C", "a"] {
        d.register(Arc::new(reg.targeted_copy(CalendarId(1), t).unwrap()), now);
    }
    let snap = d.pending_snapshot();
    for pair in snap.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let ka = (a.at_utc(), a.owner().unwrap().to_uppercase());
        let kb = (b.at_utc(), b.owner().unwrap().to_uppercase());
        assert!(ka < kb);
    }
}
