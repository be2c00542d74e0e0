//! msk-calendar
//!
//! Composite per-entity calendars and the resolution of their next/previous
//! state transitions.
//!
//! Layers, lowest priority first:
//! - weekly pattern (weekday -> day schedule)
//! - yearly recurring overrides (month-day -> day schedule)
//! - specific-date overrides (date -> day schedule)
//!
//! Pure logic apart from locking. No IO, no wall-clock: callers supply the
//! UTC instant every query is made against.

mod calendar;
pub mod codec;
mod day;
mod registry;
mod timezone;
mod transition;
mod week;

pub use calendar::{Calendar, CalendarId, CalendarObserver, MonthDay};
pub use day::DaySchedule;
pub use registry::CalendarRegistry;
pub use timezone::{TimeZoneSpec, UTC_ID};
pub use transition::{Transition, INVALID_STATE};
pub use week::{weekday_from_index, weekday_index, WeekPattern};
