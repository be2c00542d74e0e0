use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use std::fmt;

/// State code reserved for "no transition". Never stored in any container.
pub const INVALID_STATE: i32 = -1;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";
const TIME_FMT_MILLIS: &str = "%H:%M:%S%.3f";
const STAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

// `%.f` parses an optional fractional part, so both "09:00:00" and
// "09:00:00.250" are accepted.
const TIME_PARSE: &str = "%H:%M:%S%.f";
const STAMP_PARSE: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Times are kept at the precision the wire form carries.
fn to_millis(time: NaiveTime) -> NaiveTime {
    let nanos = time.nanosecond();
    time.with_nanosecond(nanos - nanos % 1_000_000).unwrap_or(time)
}

/// An atomic state change.
///
/// A transition is either time-only (a slot inside a [`crate::DaySchedule`])
/// or dated (a committed occurrence produced by calendar resolution, in UTC).
/// The owner is the target label of the calendar instance that produced it.
///
/// Field order defines the derived ordering: (date, time, state, owner).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Transition {
    date: Option<NaiveDate>,
    time: NaiveTime,
    state: i32,
    owner: Option<String>,
}

impl Transition {
    /// Time-only transition, as stored in a day schedule. Sub-millisecond
    /// precision is dropped.
    pub fn new(time: NaiveTime, state: i32) -> Self {
        Self {
            date: None,
            time: to_millis(time),
            state,
            owner: None,
        }
    }

    /// Dated transition.
    pub fn dated(at: NaiveDateTime, state: i32) -> Self {
        Self {
            date: Some(at.date()),
            time: to_millis(at.time()),
            state,
            owner: None,
        }
    }

    /// Convenience for fixtures: `Transition::at_hms(9, 0, 0, 1)`.
    ///
    /// Returns `None` for an out-of-range time.
    pub fn at_hms(hour: u32, min: u32, sec: u32, state: i32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, min, sec).map(|t| Self::new(t, state))
    }

    /// Parse the textual time forms used on the wire:
    ///
    /// - `yyyy-MM-ddTHH:mm:ss[.fff]` (dated)
    /// - `yyyy-MM-dd` (dated, 00:00)
    /// - `HH:mm:ss[.fff]` (time-only)
    pub fn parse(text: &str, state: i32) -> Option<Self> {
        let text = text.trim();
        if text.contains('T') {
            NaiveDateTime::parse_from_str(text, STAMP_PARSE)
                .ok()
                .map(|at| Self::dated(at, state))
        } else if text.contains('-') {
            NaiveDate::parse_from_str(text, DATE_FMT)
                .ok()
                .map(|d| Self::dated(d.and_time(NaiveTime::MIN), state))
        } else if text.contains(':') {
            NaiveTime::parse_from_str(text, TIME_PARSE)
                .ok()
                .map(|t| Self::new(t, state))
        } else {
            None
        }
    }

    /// Attach an owner label. Blank labels clear the owner.
    pub fn with_owner(mut self, owner: Option<&str>) -> Self {
        self.owner = owner
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.state != INVALID_STATE
    }

    pub fn state(&self) -> i32 {
        self.state
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Full timestamp, if dated.
    pub fn at(&self) -> Option<NaiveDateTime> {
        self.date.map(|d| d.and_time(self.time))
    }

    /// Full timestamp interpreted as UTC, if dated.
    pub fn at_utc(&self) -> Option<DateTime<Utc>> {
        self.at().map(|at| Utc.from_utc_datetime(&at))
    }

    /// Copy of this transition committed to `date`; time-of-day unchanged.
    pub fn on_date(&self, date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..self.clone()
        }
    }

    /// Shift a dated transition by `delta`. Time-only transitions and
    /// out-of-range results yield `None`.
    pub(crate) fn shifted(&self, delta: Duration) -> Option<Self> {
        let at = self.at()?.checked_add_signed(delta)?;
        Some(Self {
            date: Some(at.date()),
            time: at.time(),
            ..self.clone()
        })
    }

    /// Wire form of the time field: milliseconds are only written when
    /// non-zero for time-only transitions; dated transitions always carry them.
    pub fn time_text(&self) -> String {
        match self.date {
            Some(d) => d.and_time(self.time).format(STAMP_FMT).to_string(),
            None if self.time.nanosecond() >= 1_000_000 => {
                self.time.format(TIME_FMT_MILLIS).to_string()
            }
            None => self.time.format(TIME_FMT).to_string(),
        }
    }
}

impl fmt::Display for Transition {
    /// `[owner|]state@time`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(owner) = &self.owner {
            write!(f, "{owner}|")?;
        }
        match self.at() {
            Some(at) => write!(f, "{}@{}", self.state, at.format(STAMP_FMT)),
            None => write!(f, "{}@{}", self.state, self.time.format(TIME_FMT_MILLIS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn parse_accepts_all_three_forms() {
        let time_only = Transition::parse("09:30:00", 1).unwrap();
        assert_eq!(time_only.date(), None);
        assert_eq!(time_only.time(), t(9, 30, 0));

        let millis = Transition::parse("09:30:00.250", 1).unwrap();
        assert_eq!(millis.time(), NaiveTime::from_hms_milli_opt(9, 30, 0, 250).unwrap());

        let dated = Transition::parse("2024-03-04T17:00:00.000", 0).unwrap();
        assert_eq!(dated.date(), NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(dated.time(), t(17, 0, 0));

        let date_only = Transition::parse("2024-12-25", 2).unwrap();
        assert_eq!(date_only.time(), NaiveTime::MIN);
        assert_eq!(date_only.date(), NaiveDate::from_ymd_opt(2024, 12, 25));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Transition::parse("tomorrow", 1).is_none());
        assert!(Transition::parse("25:00:00", 1).is_none());
        assert!(Transition::parse("2024-13-01", 1).is_none());
    }

    #[test]
    fn display_is_canonical_form() {
        let tr = Transition::at_hms(9, 0, 0, 1).unwrap();
        assert_eq!(tr.to_string(), "1@09:00:00.000");

        let dated = tr
            .on_date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
            .with_owner(Some("AAA"));
        assert_eq!(dated.to_string(), "AAA|1@2024-03-04T09:00:00.000");
    }

    #[test]
    fn sub_millisecond_precision_is_dropped() {
        let fine = NaiveTime::from_hms_micro_opt(9, 0, 0, 1_500).unwrap();
        let tr = Transition::new(fine, 1);
        assert_eq!(tr.time(), NaiveTime::from_hms_milli_opt(9, 0, 0, 1).unwrap());
        assert_eq!(tr.time_text(), "09:00:00.001");
        assert_eq!(Transition::parse(&tr.time_text(), 1), Some(tr));

        let below = Transition::new(NaiveTime::from_hms_micro_opt(9, 0, 0, 700).unwrap(), 1);
        assert_eq!(below.time(), t(9, 0, 0));
        assert_eq!(below.time_text(), "09:00:00");
    }

    #[test]
    fn blank_owner_is_no_owner() {
        let tr = Transition::at_hms(9, 0, 0, 1).unwrap().with_owner(Some("  "));
        assert_eq!(tr.owner(), None);
    }

    #[test]
    fn time_text_only_writes_millis_when_present() {
        assert_eq!(Transition::at_hms(9, 0, 0, 1).unwrap().time_text(), "09:00:00");
        let ms = Transition::new(NaiveTime::from_hms_milli_opt(9, 0, 0, 5).unwrap(), 1);
        assert_eq!(ms.time_text(), "09:00:00.005");
        let dated = ms.on_date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(dated.time_text(), "2024-01-02T09:00:00.005");
    }

    #[test]
    fn shifting_crosses_midnight() {
        let tr = Transition::at_hms(23, 0, 0, 1)
            .unwrap()
            .on_date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let moved = tr.shifted(Duration::hours(2)).unwrap();
        assert_eq!(moved.date(), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(moved.time(), t(1, 0, 0));
        assert!(Transition::at_hms(1, 0, 0, 1).unwrap().shifted(Duration::hours(1)).is_none());
    }

    #[test]
    fn invalid_state_is_detectable() {
        assert!(!Transition::at_hms(9, 0, 0, INVALID_STATE).unwrap().is_valid());
        assert!(Transition::at_hms(9, 0, 0, 0).unwrap().is_valid());
    }
}
