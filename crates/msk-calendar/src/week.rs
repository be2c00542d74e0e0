use chrono::Weekday;
use std::collections::BTreeMap;
use std::fmt;
use tracing::error;

use crate::DaySchedule;

/// Weekday index used by storage and the wire format: Sunday = 0 .. Saturday = 6.
pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

/// Inverse of [`weekday_index`]. `None` outside `0..=6`.
pub fn weekday_from_index(idx: u8) -> Option<Weekday> {
    match idx {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Weekday -> day schedule assignment, drawing from a catalog of named
/// day schedules.
///
/// Every assigned name is expected to exist in the catalog. A dangling name
/// is a lookup miss: it is reported when the pattern is resolved and the day
/// is skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeekPattern {
    name: String,
    days: BTreeMap<u8, String>,
    catalog: BTreeMap<String, DaySchedule>,
}

impl WeekPattern {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog `ds` (replacing a same-named entry) and bind it to `day`,
    /// replacing any previous binding.
    pub fn assign(&mut self, day: Weekday, ds: DaySchedule) {
        let name = ds.name().to_string();
        self.catalog.insert(name.clone(), ds);
        self.days.insert(weekday_index(day), name);
    }

    /// Make `ds` available to [`WeekPattern::use_schedule`] without binding it.
    pub fn catalog_insert(&mut self, ds: DaySchedule) {
        self.catalog.insert(ds.name().to_string(), ds);
    }

    /// Bind an already-catalogued schedule to `day`. Fails if the name is unknown.
    pub fn use_schedule(&mut self, day: Weekday, schedule_name: &str) -> bool {
        if !self.catalog.contains_key(schedule_name) {
            return false;
        }
        self.days
            .insert(weekday_index(day), schedule_name.to_string());
        true
    }

    pub fn unassign(&mut self, day: Weekday) -> bool {
        self.days.remove(&weekday_index(day)).is_some()
    }

    pub fn assignment(&self, day: Weekday) -> Option<&str> {
        self.days.get(&weekday_index(day)).map(String::as_str)
    }

    /// Bindings in weekday-index order (Sunday first).
    pub fn assignments(&self) -> impl Iterator<Item = (Weekday, &str)> {
        self.days
            .iter()
            .filter_map(|(idx, name)| weekday_from_index(*idx).map(|d| (d, name.as_str())))
    }

    pub fn catalog(&self) -> &BTreeMap<String, DaySchedule> {
        &self.catalog
    }

    /// Number of bound weekdays.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Weekday index -> day schedule, resolving names through the catalog.
    pub fn resolved_map(&self) -> BTreeMap<u8, &DaySchedule> {
        let mut out = BTreeMap::new();
        for (idx, name) in &self.days {
            match self.catalog.get(name) {
                Some(ds) => {
                    out.insert(*idx, ds);
                }
                None => {
                    error!(week = %self.name, weekday = idx, schedule = %name, "day schedule missing from week catalog");
                }
            }
        }
        out
    }
}

impl fmt::Display for WeekPattern {
    /// `name:WkSch:[{Mon,session},...],Wk_DSLookup:[{session,...},...]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:WkSch:[", self.name)?;
        for (i, (day, name)) in self.assignments().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{{{day},{name}}}")?;
        }
        f.write_str("],Wk_DSLookup:[")?;
        for (i, (name, ds)) in self.catalog.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{{{name},{ds}}}")?;
        }
        f.write_str("]")
    }
}
