//! Targeted instances never alias their master.

use chrono::{NaiveDate, Weekday};
use msk_calendar::{codec, Calendar, CalendarId, CalendarRegistry, DaySchedule, Transition};
use msk_testkit::utc;

fn master() -> Calendar {
    let cal = Calendar::new("Exchange-A");
    cal.add_day_schedule_for_weekday(
        Weekday::Mon,
        DaySchedule::with_transitions("mon", [Transition::at_hms(9, 0, 0, 1).unwrap()]),
    );
    cal
}

#[test]
fn edits_on_a_copy_do_not_leak() {
    let reg = CalendarRegistry::new();
    reg.insert(CalendarId(1), master());
    let a = reg.targeted_copy(CalendarId(1), "A").unwrap();
    a.add_day_schedule_for_weekday(
        Weekday::Mon,
        DaySchedule::with_transitions("mon", [Transition::at_hms(10, 0, 0, 1).unwrap()]),
    );

    let q = utc("2024-03-04T08:00:00Z");
    assert_eq!(a.resolve_next(q).unwrap().at_utc(), Some(utc("2024-03-04T10:00:00Z")));
    let m = reg.master(CalendarId(1)).unwrap();
    assert_eq!(m.resolve_next(q).unwrap().at_utc(), Some(utc("2024-03-04T09:00:00Z")));
    let b = reg.targeted_copy(CalendarId(1), "B").unwrap();
    assert_eq!(b.resolve_next(q).unwrap().at_utc(), Some(utc("2024-03-04T09:00:00Z")));
}

#[test]
fn master_edits_do_not_reach_existing_copies() {
    let reg = CalendarRegistry::new();
    reg.insert(CalendarId(1), master());
    let a = reg.targeted_copy(CalendarId(1), "A").unwrap();
    reg.master(CalendarId(1))
        .unwrap()
        .add_for_date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), DaySchedule::new("closed"));
    assert!(a.specific_overrides().is_empty());
    assert!(reg.master_copy(CalendarId(1)).unwrap().specific_overrides().len() == 1);
}

#[test]
fn populate_from_documents() {
    let reg = CalendarRegistry::new();
    reg.insert_encoded(CalendarId(5), &codec::encode(&master())).unwrap();
    assert!(reg.exists(CalendarId(5)));
    assert_eq!(reg.master(CalendarId(5)).unwrap().key(), "Exchange-A[5]");
    assert!(reg.insert_encoded(CalendarId(6), "{\"Name\":1}").is_err());
    assert!(!reg.exists(CalendarId(6)));
}
