use chrono::NaiveTime;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};

use crate::Transition;

/// The transitions of one civil day, unique by time-of-day.
///
/// Lookups are bounded to the day `[00:00:00, 24:00:00)`: there is no wrap
/// across midnight. Crossing into an adjacent day is the calendar's job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DaySchedule {
    name: String,
    transitions: BTreeMap<NaiveTime, Transition>,
}

impl DaySchedule {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            transitions: BTreeMap::new(),
        }
    }

    /// Builder used by fixtures: every pair is added in order; invalid or
    /// duplicate entries are dropped exactly as [`DaySchedule::add`] would.
    pub fn with_transitions<S, I>(name: S, transitions: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = Transition>,
    {
        let mut ds = Self::new(name);
        for tr in transitions {
            ds.add(tr);
        }
        ds
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    /// Add a transition. Fails if one already exists at that time-of-day or
    /// if the transition carries the invalid state. Only the time-of-day of
    /// the argument is kept.
    pub fn add(&mut self, tr: Transition) -> bool {
        if !tr.is_valid() || self.transitions.contains_key(&tr.time()) {
            return false;
        }
        let slot = Transition::new(tr.time(), tr.state());
        self.transitions.insert(tr.time(), slot);
        true
    }

    /// Remove the transition at the argument's time-of-day.
    pub fn remove(&mut self, tr: &Transition) -> bool {
        self.transitions.remove(&tr.time()).is_some()
    }

    /// Smallest stored time strictly greater than `time`.
    pub fn next_after(&self, time: NaiveTime) -> Option<&Transition> {
        self.transitions
            .range((Excluded(time), Unbounded))
            .next()
            .map(|(_, tr)| tr)
    }

    /// Largest stored time less than or equal to `time`.
    pub fn previous_at_or_before(&self, time: NaiveTime) -> Option<&Transition> {
        self.transitions.range(..=time).next_back().map(|(_, tr)| tr)
    }

    /// Earliest transition of the day, midnight included.
    pub fn first(&self) -> Option<&Transition> {
        self.transitions.values().next()
    }

    /// Latest transition of the day.
    pub fn last(&self) -> Option<&Transition> {
        self.transitions.values().next_back()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl fmt::Display for DaySchedule {
    /// `name:[t1,t2,...]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[", self.name)?;
        for (i, tr) in self.transitions.values().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{tr}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INVALID_STATE;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn session() -> DaySchedule {
        DaySchedule::with_transitions(
            "session",
            [
                Transition::at_hms(9, 0, 0, 1).unwrap(),
                Transition::at_hms(17, 0, 0, 0).unwrap(),
            ],
        )
    }

    #[test]
    fn add_rejects_duplicate_time_of_day() {
        let mut ds = session();
        assert!(!ds.add(Transition::at_hms(9, 0, 0, 7).unwrap()));
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.next_after(t(8, 0, 0)).unwrap().state(), 1);
    }

    #[test]
    fn add_rejects_invalid_state() {
        let mut ds = DaySchedule::new("x");
        assert!(!ds.add(Transition::at_hms(9, 0, 0, INVALID_STATE).unwrap()));
        assert!(ds.is_empty());
    }

    #[test]
    fn add_strips_date_and_owner() {
        let mut ds = DaySchedule::new("x");
        let dated = Transition::parse("2024-03-04T09:00:00.000", 1)
            .unwrap()
            .with_owner(Some("AAA"));
        assert!(ds.add(dated));
        let stored = ds.first().unwrap();
        assert_eq!(stored.date(), None);
        assert_eq!(stored.owner(), None);
    }

    #[test]
    fn next_after_is_strict() {
        let ds = session();
        assert_eq!(ds.next_after(t(9, 0, 0)).unwrap().time(), t(17, 0, 0));
        assert_eq!(ds.next_after(t(8, 59, 59)).unwrap().time(), t(9, 0, 0));
        assert!(ds.next_after(t(17, 0, 0)).is_none());
    }

    #[test]
    fn previous_is_inclusive() {
        let ds = session();
        assert_eq!(ds.previous_at_or_before(t(17, 0, 0)).unwrap().time(), t(17, 0, 0));
        assert_eq!(ds.previous_at_or_before(t(16, 59, 59)).unwrap().time(), t(9, 0, 0));
        assert!(ds.previous_at_or_before(t(8, 0, 0)).is_none());
    }

    #[test]
    fn no_wrap_across_midnight() {
        let ds = session();
        assert!(ds.next_after(t(23, 59, 59)).is_none());
        assert!(ds.previous_at_or_before(NaiveTime::MIN).is_none());
    }

    #[test]
    fn remove_by_time_of_day() {
        let mut ds = session();
        assert!(ds.remove(&Transition::at_hms(9, 0, 0, 42).unwrap()));
        assert!(!ds.remove(&Transition::at_hms(9, 0, 0, 1).unwrap()));
        assert_eq!(ds.first().unwrap().time(), t(17, 0, 0));
    }

    #[test]
    fn display_lists_in_time_order() {
        assert_eq!(
            session().to_string(),
            "session:[1@09:00:00.000,0@17:00:00.000]"
        );
    }
}
