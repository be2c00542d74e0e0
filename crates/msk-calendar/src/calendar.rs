//! The composite calendar.
//!
//! # Resolution
//!
//! A query instant is moved to calendar-local civil time with the fixed base
//! offset, then the three layers are overlaid for a three-week window around
//! the local date (ascending priority):
//!
//! 1. weekly pattern, projected onto every date of the window
//! 2. yearly recurring overrides, projected onto each calendar year touched
//! 3. specific-date overrides
//!
//! A date present in a higher layer replaces the whole day of a lower layer.
//! The merged dates are scanned in time order from the local date; when the
//! window is exhausted the scan moves to the adjacent window, up to a two-year
//! horizon (stretched to the furthest specific date).
//!
//! # Locking
//!
//! Each calendar owns one mutex over its state and observer list. Mutators
//! bump the sequence number under the lock, copy the observer list, release
//! the lock, and only then call the observers. Observers (dispatchers) lock
//! themselves and then this calendar, never the other way round.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error};

use crate::{weekday_index, DaySchedule, TimeZoneSpec, Transition, WeekPattern};

/// How far a scan may walk away from the query date before giving up.
const HORIZON_DAYS: i64 = 731;

/// Leap year used to validate month-day keys.
const LEAP_REFERENCE_YEAR: i32 = 2000;

/// Persistent identifier of a master calendar. Only positive ids are valid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarId(pub i64);

impl CalendarId {
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for CalendarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a yearly recurring override. 29 February is accepted and only
/// applies in leap years.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(LEAP_REFERENCE_YEAR, month, day)?;
        Some(Self { month, day })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    /// Accepts `yyyy-MM-dd` (the year is ignored) or `MM-dd`.
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.trim().split('-').collect();
        let (month, day) = match parts.as_slice() {
            [year, month, day] if !year.is_empty() && year.bytes().all(|b| b.is_ascii_digit()) => {
                (*month, *day)
            }
            [month, day] => (*month, *day),
            _ => return None,
        };
        Self::new(month.parse().ok()?, day.parse().ok()?)
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// The date this key falls on in `year`; `None` for 29 February in a
    /// common year.
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl From<NaiveDate> for MonthDay {
    fn from(date: NaiveDate) -> Self {
        Self::of(date)
    }
}

/// Notified after a calendar's content changed. The calendar lock is not
/// held during the call.
pub trait CalendarObserver: Send + Sync {
    fn calendar_changed(&self, calendar: &Calendar);
}

#[derive(Clone, Debug)]
struct CalendarState {
    name: String,
    id: CalendarId,
    target: Option<String>,
    tz: TimeZoneSpec,
    week: WeekPattern,
    yearly: BTreeMap<MonthDay, String>,
    specific: BTreeMap<NaiveDate, String>,
    catalog: BTreeMap<String, DaySchedule>,
    sequence: u64,
    read_next: Option<DateTime<Utc>>,
    read_prev: Option<DateTime<Utc>>,
    /// Yearly overrides projected onto a year: date -> schedule name.
    yearly_cache: HashMap<i32, BTreeMap<NaiveDate, String>>,
}

struct Inner {
    state: CalendarState,
    observers: Vec<Weak<dyn CalendarObserver>>,
}

/// A named, timezone-bound composite calendar.
///
/// `Clone` is a deep copy: containers are duplicated, the copy gets its own
/// lock and starts with no observers. Share one instance with `Arc<Calendar>`.
pub struct Calendar {
    inner: Mutex<Inner>,
}

impl Calendar {
    pub fn new<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        let state = CalendarState {
            week: WeekPattern::new(format!("{name}-week")),
            name,
            id: CalendarId::default(),
            target: None,
            tz: TimeZoneSpec::utc(),
            yearly: BTreeMap::new(),
            specific: BTreeMap::new(),
            catalog: BTreeMap::new(),
            sequence: 1,
            read_next: None,
            read_prev: None,
            yearly_cache: HashMap::new(),
        };
        Self::from_state(state)
    }

    fn from_state(state: CalendarState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                observers: Vec::new(),
            }),
        }
    }

    /// Assemble a calendar from decoded parts. Not a mutation: no sequence
    /// bump, no notification.
    pub(crate) fn assemble(
        name: String,
        tz: TimeZoneSpec,
        week: WeekPattern,
        catalog: BTreeMap<String, DaySchedule>,
        yearly: BTreeMap<MonthDay, String>,
        specific: BTreeMap<NaiveDate, String>,
    ) -> Self {
        let mut cal = Self::new(name);
        {
            let state = &mut cal.inner_mut().state;
            state.tz = tz;
            state.week = week;
            state.catalog = catalog;
            state.yearly = yearly;
            state.specific = specific;
        }
        cal
    }

    /// Attach the persistent id. Used when a calendar enters a registry.
    pub fn with_id(mut self, id: CalendarId) -> Self {
        self.inner_mut().state.id = id;
        self
    }

    pub fn with_timezone(mut self, tz_id: &str) -> Self {
        self.inner_mut().state.tz = TimeZoneSpec::resolve(tz_id);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Copies
    // -----------------------------------------------------------------------

    fn copy_with_target(&self, target: Option<&str>) -> Calendar {
        let mut state = self.lock().state.clone();
        state.target = target
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self::from_state(state)
    }

    /// Deep copy bound to `target`. A blank target yields an untargeted copy.
    pub fn targeted_copy(&self, target: &str) -> Calendar {
        self.copy_with_target(Some(target))
    }

    /// Deep copy with the target cleared (a master template).
    pub fn master_copy(&self) -> Calendar {
        self.copy_with_target(None)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> String {
        self.lock().state.name.clone()
    }

    pub fn target(&self) -> Option<String> {
        self.lock().state.target.clone()
    }

    pub fn persistent_id(&self) -> CalendarId {
        self.lock().state.id
    }

    pub fn sequence(&self) -> u64 {
        self.lock().state.sequence
    }

    pub fn timezone(&self) -> TimeZoneSpec {
        self.lock().state.tz.clone()
    }

    pub fn week_pattern(&self) -> WeekPattern {
        self.lock().state.week.clone()
    }

    pub fn yearly_overrides(&self) -> BTreeMap<MonthDay, String> {
        self.lock().state.yearly.clone()
    }

    pub fn specific_overrides(&self) -> BTreeMap<NaiveDate, String> {
        self.lock().state.specific.clone()
    }

    /// The override catalog only (shared by yearly and specific overrides).
    pub fn override_catalog(&self) -> BTreeMap<String, DaySchedule> {
        self.lock().state.catalog.clone()
    }

    /// Every day schedule known to the calendar: the week catalog plus the
    /// override catalog (override entries win on a name clash).
    pub fn day_schedules(&self) -> BTreeMap<String, DaySchedule> {
        let inner = self.lock();
        let mut out = inner.state.week.catalog().clone();
        out.extend(
            inner
                .state
                .catalog
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        out
    }

    /// UTC instants of the last `resolve_next` / `resolve_previous` queries.
    pub fn read_points(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let inner = self.lock();
        (inner.state.read_next, inner.state.read_prev)
    }

    pub fn set_read_points(&self, next: Option<DateTime<Utc>>, prev: Option<DateTime<Utc>>) {
        let mut inner = self.lock();
        inner.state.read_next = next;
        inner.state.read_prev = prev;
    }

    /// Canonical identity: `name[id]`, plus `@target` for targeted instances.
    pub fn key(&self) -> String {
        self.lock().state.key()
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Returns false if the observer is already registered.
    pub fn add_observer(&self, observer: Weak<dyn CalendarObserver>) -> bool {
        let mut inner = self.lock();
        if inner
            .observers
            .iter()
            .any(|o| same_observer(o, &observer))
        {
            return false;
        }
        inner.observers.push(observer);
        true
    }

    pub fn remove_observer(&self, observer: &Weak<dyn CalendarObserver>) -> bool {
        let mut inner = self.lock();
        let before = inner.observers.len();
        inner.observers.retain(|o| !same_observer(o, observer));
        inner.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.lock()
            .observers
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Apply `f` under the lock. When it reports a change, bump the sequence,
    /// then notify observers after the lock is released.
    fn mutate<R>(&self, what: &str, f: impl FnOnce(&mut CalendarState) -> (R, bool)) -> R {
        let (result, observers) = {
            let mut inner = self.lock();
            let (result, changed) = f(&mut inner.state);
            if !changed {
                return result;
            }
            inner.state.sequence += 1;
            debug!(
                calendar = %inner.state.key(),
                sequence = inner.state.sequence,
                change = what,
                "calendar changed"
            );
            inner.observers.retain(|o| o.strong_count() > 0);
            let observers: Vec<Arc<dyn CalendarObserver>> =
                inner.observers.iter().filter_map(Weak::upgrade).collect();
            (result, observers)
        };

        for observer in observers {
            observer.calendar_changed(self);
        }
        result
    }

    /// Rebind the timezone. Returns the id in effect (UTC for unknown ids).
    pub fn set_timezone(&self, tz_id: &str) -> String {
        self.mutate("timezone", |s| {
            s.tz = TimeZoneSpec::resolve(tz_id);
            (s.tz.id().to_string(), true)
        })
    }

    pub fn set_week_pattern(&self, week: WeekPattern) {
        self.mutate("week pattern", |s| {
            s.week = week;
            ((), true)
        })
    }

    /// Catalog `ds` in the weekly pattern and bind it to `day`.
    pub fn add_day_schedule_for_weekday(&self, day: Weekday, ds: DaySchedule) {
        self.mutate("weekday schedule added", |s| {
            s.week.assign(day, ds);
            ((), true)
        })
    }

    pub fn remove_day_schedule_for_weekday(&self, day: Weekday) -> bool {
        self.mutate("weekday schedule removed", |s| {
            let removed = s.week.unassign(day);
            (removed, removed)
        })
    }

    /// One-off override for `date`, replacing any existing one.
    pub fn add_for_date(&self, date: NaiveDate, ds: DaySchedule) {
        self.mutate("specific date added", |s| {
            s.yearly_cache.clear();
            let name = ds.name().to_string();
            s.catalog.insert(name.clone(), ds);
            s.specific.insert(date, name);
            ((), true)
        })
    }

    pub fn remove_for_date(&self, date: NaiveDate) -> bool {
        self.mutate("specific date removed", |s| {
            let removed = s.specific.remove(&date).is_some();
            if removed {
                s.yearly_cache.clear();
            }
            (removed, removed)
        })
    }

    /// Override recurring every year on `day`, replacing any existing one.
    pub fn add_for_recurring_date(&self, day: MonthDay, ds: DaySchedule) {
        self.mutate("recurring date added", |s| {
            s.yearly_cache.clear();
            let name = ds.name().to_string();
            s.catalog.insert(name.clone(), ds);
            s.yearly.insert(day, name);
            ((), true)
        })
    }

    pub fn remove_for_recurring_date(&self, day: MonthDay) -> bool {
        self.mutate("recurring date removed", |s| {
            let removed = s.yearly.remove(&day).is_some();
            if removed {
                s.yearly_cache.clear();
            }
            (removed, removed)
        })
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// First transition strictly after `at`, in UTC, owned by this instance's
    /// target. Records `at` as the next read point.
    pub fn resolve_next(&self, at: DateTime<Utc>) -> Option<Transition> {
        let mut inner = self.lock();
        let found = inner.state.resolve_next(at);
        debug!(
            calendar = %inner.state.key(),
            query = %at,
            found = ?found.as_ref().map(ToString::to_string),
            "resolve_next"
        );
        found
    }

    /// Last transition at or before `at`, in UTC. Records `at` as the
    /// previous read point.
    pub fn resolve_previous(&self, at: DateTime<Utc>) -> Option<Transition> {
        let mut inner = self.lock();
        let found = inner.state.resolve_previous(at);
        debug!(
            calendar = %inner.state.key(),
            query = %at,
            found = ?found.as_ref().map(ToString::to_string),
            "resolve_previous"
        );
        found
    }

    /// Multi-line dump of the whole calendar.
    pub fn diagnostic(&self) -> String {
        let inner = self.lock();
        let s = &inner.state;
        let mut out = String::new();
        out.push_str(&format!("{}: seq={}\n", s.key(), s.sequence));
        match &s.target {
            Some(t) => out.push_str(&format!("  Target: {t}\n")),
            None => out.push_str("  Target: (none)\n"),
        }
        out.push_str(&format!(
            "  TZ: {} (base offset {})\n",
            s.tz.id(),
            s.tz.base_offset()
        ));
        out.push_str(&format!("  DefWkSchd: {}\n", s.week));
        out.push_str("  S_DSLookup:\n");
        for ds in s.catalog.values() {
            out.push_str(&format!("    {ds}\n"));
        }
        out.push_str("  RepYearly:\n");
        for (day, name) in &s.yearly {
            out.push_str(&format!("    {day} -> {name}\n"));
        }
        out.push_str("  Specific:\n");
        for (date, name) in &s.specific {
            out.push_str(&format!("    {date} -> {name}\n"));
        }
        out.push_str(&format!(
            "  ReadPoints: next={:?} prev={:?}\n",
            s.read_next, s.read_prev
        ));
        out
    }
}

impl Clone for Calendar {
    fn clone(&self) -> Self {
        Self::from_state(self.lock().state.clone())
    }
}

impl PartialEq for Calendar {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.key() == other.key()
    }
}

impl Eq for Calendar {}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl fmt::Debug for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Calendar")
            .field("key", &inner.state.key())
            .field("sequence", &inner.state.sequence)
            .field("tz", &inner.state.tz.id())
            .field("observers", &inner.observers.len())
            .finish()
    }
}

fn same_observer(a: &Weak<dyn CalendarObserver>, b: &Weak<dyn CalendarObserver>) -> bool {
    std::ptr::eq(a.as_ptr() as *const (), b.as_ptr() as *const ())
}

/// Sunday-started week containing `date`, widened by one week each side:
/// (previous week's Sunday, next week's Saturday).
fn week_window(date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let back = i64::from(date.weekday().num_days_from_sunday());
    let sunday = date.checked_sub_signed(Duration::days(back))?;
    Some((
        sunday.checked_sub_signed(Duration::days(7))?,
        sunday.checked_add_signed(Duration::days(13))?,
    ))
}

impl CalendarState {
    fn key(&self) -> String {
        match &self.target {
            Some(t) => format!("{}[{}]@{}", self.name, self.id, t),
            None => format!("{}[{}]", self.name, self.id),
        }
    }

    fn resolve_next(&mut self, at: DateTime<Utc>) -> Option<Transition> {
        self.read_next = Some(at);
        let local = self.tz.to_local(at)?;
        let found = self.next_local(local)?;
        self.commit(&found)
    }

    fn resolve_previous(&mut self, at: DateTime<Utc>) -> Option<Transition> {
        self.read_prev = Some(at);
        let local = self.tz.to_local(at)?;
        let found = self.previous_local(local)?;
        self.commit(&found)
    }

    /// Local dated transition -> UTC, stamped with the target.
    fn commit(&self, local: &Transition) -> Option<Transition> {
        local
            .shifted(-self.tz.offset())
            .map(|tr| tr.with_owner(self.target.as_deref()))
    }

    fn nothing_on_or_after(&self, date: NaiveDate) -> bool {
        self.yearly.is_empty() && self.week.is_empty() && self.specific.range(date..).next().is_none()
    }

    fn nothing_on_or_before(&self, date: NaiveDate) -> bool {
        self.yearly.is_empty() && self.week.is_empty() && self.specific.range(..=date).next().is_none()
    }

    fn next_local(&mut self, local: NaiveDateTime) -> Option<Transition> {
        let from = local.date();
        if self.nothing_on_or_after(from) {
            return None;
        }

        let mut horizon = from.checked_add_signed(Duration::days(HORIZON_DAYS))?;
        if let Some(last) = self.specific.keys().next_back() {
            horizon = horizon.max(*last);
        }

        let mut day = from;
        let mut after = Some(local.time());
        while day <= horizon {
            let (start, end) = week_window(day)?;
            self.project_yearly(start.year());
            self.project_yearly(end.year());

            let merged = self.merged_window(start, end);
            for (date, ds) in merged.range(day..=end) {
                let hit = match after {
                    Some(t) if *date == day => ds.next_after(t),
                    _ => ds.first(),
                };
                if let Some(tr) = hit {
                    return Some(tr.on_date(*date));
                }
            }

            day = end.succ_opt()?;
            after = None;
        }
        None
    }

    fn previous_local(&mut self, local: NaiveDateTime) -> Option<Transition> {
        let from = local.date();
        if self.nothing_on_or_before(from) {
            return None;
        }

        let mut horizon = from.checked_sub_signed(Duration::days(HORIZON_DAYS))?;
        if let Some(first) = self.specific.keys().next() {
            horizon = horizon.min(*first);
        }

        let mut day = from;
        let mut upto = Some(local.time());
        while day >= horizon {
            let (start, _) = week_window(day)?;
            self.project_yearly(start.year());
            self.project_yearly(day.year());

            let merged = self.merged_window(start, day);
            for (date, ds) in merged.range(start..=day).rev() {
                let hit = match upto {
                    Some(t) if *date == day => ds.previous_at_or_before(t),
                    _ => ds.last(),
                };
                if let Some(tr) = hit {
                    return Some(tr.on_date(*date));
                }
            }

            day = start.pred_opt()?;
            upto = None;
        }
        None
    }

    /// Memoize the yearly overrides projected onto `year`.
    fn project_yearly(&mut self, year: i32) {
        if self.yearly.is_empty() || self.yearly_cache.contains_key(&year) {
            return;
        }
        let projected: BTreeMap<NaiveDate, String> = self
            .yearly
            .iter()
            .filter_map(|(day, name)| day.in_year(year).map(|d| (d, name.clone())))
            .collect();
        self.yearly_cache.insert(year, projected);
    }

    /// Overlay the three layers over `[start, end]`.
    fn merged_window(&self, start: NaiveDate, end: NaiveDate) -> BTreeMap<NaiveDate, &DaySchedule> {
        let mut merged = BTreeMap::new();

        let week = self.week.resolved_map();
        if !week.is_empty() {
            for date in start.iter_days().take_while(|d| *d <= end) {
                if let Some(ds) = week.get(&weekday_index(date.weekday())) {
                    merged.insert(date, *ds);
                }
            }
        }

        for year in start.year()..=end.year() {
            if let Some(projected) = self.yearly_cache.get(&year) {
                for (date, name) in projected.range(start..=end) {
                    if let Some(ds) = self.lookup(name) {
                        merged.insert(*date, ds);
                    }
                }
            }
        }

        for (date, name) in self.specific.range(start..=end) {
            if let Some(ds) = self.lookup(name) {
                merged.insert(*date, ds);
            }
        }

        merged
    }

    fn lookup(&self, name: &str) -> Option<&DaySchedule> {
        let ds = self.catalog.get(name);
        if ds.is_none() {
            error!(calendar = %self.key(), schedule = %name, "day schedule missing from override catalog");
        }
        ds
    }
}
