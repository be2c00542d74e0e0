//! The dispatcher.
//!
//! # State
//!
//! ```text
//! queue        (utc time, TARGET) -> pending transition   (time order)
//! by_calendar  TARGET             -> pending transition   (mirror of queue)
//! by_target    TARGET             -> calendar instance    (1:1)
//! by_id        persistent id      -> TARGET -> instance   (fan-out)
//! ```
//!
//! `TARGET` is the upper-cased target label: targets match case-insensitively
//! and same-instant ties are broken by it. All four maps sit behind one mutex
//! and change together.
//!
//! # Invariants
//!
//! - A registered instance has at most one pending transition.
//! - A pending transition always belongs to a registered instance.
//! - After an upstream edit, the stale pending transition is gone before the
//!   replacement instance queues its own.
//! - An edit on a master rebuilds every instance with that persistent id. An
//!   edit on one instance re-resolves that instance only.
//!
//! # Locking
//!
//! The dispatcher locks itself, then calendars (to resolve). Calendars never
//! call back while holding their own lock, so the order cannot invert.

use chrono::{DateTime, Utc};
use msk_calendar::{Calendar, CalendarId, CalendarObserver, Transition};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct DispatchState {
    queue: BTreeMap<(DateTime<Utc>, String), Transition>,
    by_calendar: HashMap<String, Transition>,
    by_target: BTreeMap<String, Arc<Calendar>>,
    by_id: BTreeMap<CalendarId, BTreeMap<String, Arc<Calendar>>>,
}

pub struct Dispatcher {
    name: String,
    me: Weak<Dispatcher>,
    state: Mutex<DispatchState>,
}

fn target_key(target: &str) -> String {
    target.trim().to_uppercase()
}

impl Dispatcher {
    pub fn new<S: Into<String>>(name: S) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|me| Self {
            name,
            me: me.clone(),
            state: Mutex::new(DispatchState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer(&self) -> Weak<dyn CalendarObserver> {
        self.me.clone() as Weak<dyn CalendarObserver>
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a targeted instance and queue its first transition after
    /// `now`. Fails for untargeted calendars, non-positive persistent ids and
    /// already-registered targets.
    pub fn register(&self, cal: Arc<Calendar>, now: DateTime<Utc>) -> bool {
        let Some(target) = cal.target() else {
            warn!(dispatcher = %self.name, calendar = %cal.key(), "register: calendar has no target");
            return false;
        };
        if !cal.persistent_id().is_valid() {
            warn!(dispatcher = %self.name, calendar = %cal.key(), "register: invalid persistent id");
            return false;
        }
        let key = target_key(&target);

        let mut st = self.lock();
        if st.by_target.contains_key(&key) {
            warn!(dispatcher = %self.name, target = %target, "register: target already registered");
            return false;
        }
        trace!(dispatcher = %self.name, state = %st.dump(), "register: before");

        cal.add_observer(self.observer());
        let id = cal.persistent_id();
        st.by_target.insert(key.clone(), Arc::clone(&cal));
        st.by_id
            .entry(id)
            .or_default()
            .insert(key.clone(), Arc::clone(&cal));
        st.queue_next(&self.name, &key, &cal, now);

        info!(dispatcher = %self.name, calendar = %cal.key(), "calendar registered");
        trace!(dispatcher = %self.name, state = %st.dump(), "register: after");
        true
    }

    /// Remove the instance registered for `target`. Fails when the arguments
    /// are invalid, the target is unknown, or it is bound to a different id.
    pub fn unregister(&self, id: CalendarId, target: &str) -> bool {
        if !id.is_valid() {
            warn!(dispatcher = %self.name, id = %id, "unregister: invalid persistent id");
            return false;
        }
        if target.trim().is_empty() {
            warn!(dispatcher = %self.name, id = %id, "unregister: blank target");
            return false;
        }
        let key = target_key(target);

        let mut st = self.lock();
        let Some(cal) = st.by_target.get(&key).cloned() else {
            error!(dispatcher = %self.name, target = %target, "unregister: target not registered");
            return false;
        };
        if cal.persistent_id() != id {
            error!(
                dispatcher = %self.name,
                target = %target,
                requested = %id,
                registered = %cal.persistent_id(),
                "unregister: target bound to a different calendar"
            );
            return false;
        }
        trace!(dispatcher = %self.name, state = %st.dump(), "unregister: before");

        if st.drop_pending(&key).is_none() {
            warn!(dispatcher = %self.name, target = %target, "unregister: no pending transition");
        }
        st.by_target.remove(&key);
        if let Some(instances) = st.by_id.get_mut(&id) {
            instances.remove(&key);
            if instances.is_empty() {
                st.by_id.remove(&id);
            }
        }
        cal.remove_observer(&self.observer());

        info!(dispatcher = %self.name, calendar = %cal.key(), "calendar unregistered");
        trace!(dispatcher = %self.name, state = %st.dump(), "unregister: after");
        true
    }

    /// Observe a master template: edits on it are propagated to every
    /// registered instance with the same persistent id.
    pub fn follow(&self, master: &Calendar) -> bool {
        master.add_observer(self.observer())
    }

    pub fn unfollow(&self, master: &Calendar) -> bool {
        master.remove_observer(&self.observer())
    }

    /// React to an edit on `changed`.
    ///
    /// A master (untargeted) edit replaces every instance sharing its
    /// persistent id with a fresh targeted copy. An instance edit drops that
    /// instance's pending transition and resolves it again, leaving sibling
    /// instances untouched.
    pub fn update(&self, changed: &Calendar) {
        match changed.target() {
            None => self.rebuild_from_master(changed),
            Some(target) => self.refresh_instance(changed, &target),
        }
    }

    fn rebuild_from_master(&self, master: &Calendar) {
        let id = master.persistent_id();
        let me = self.observer();

        let mut st = self.lock();
        let instances: Vec<(String, Arc<Calendar>)> = match st.by_id.get(&id) {
            Some(m) => m.iter().map(|(k, c)| (k.clone(), Arc::clone(c))).collect(),
            None => {
                debug!(dispatcher = %self.name, calendar = %master.key(), "update: no registered instances");
                return;
            }
        };
        trace!(dispatcher = %self.name, state = %st.dump(), "update: before");

        for (key, old) in instances {
            st.drop_pending(&key);

            let target = old.target().unwrap_or_else(|| key.clone());
            let replacement = Arc::new(master.targeted_copy(&target));
            let (next, prev) = old.read_points();
            replacement.set_read_points(next, prev);

            old.remove_observer(&me);
            replacement.add_observer(me.clone());

            st.by_target.insert(key.clone(), Arc::clone(&replacement));
            st.by_id
                .entry(id)
                .or_default()
                .insert(key.clone(), Arc::clone(&replacement));

            if let Some(from) = next.or(prev) {
                st.queue_next(&self.name, &key, &replacement, from);
            }
            info!(
                dispatcher = %self.name,
                calendar = %replacement.key(),
                sequence = replacement.sequence(),
                "calendar instance replaced"
            );
        }
        trace!(dispatcher = %self.name, state = %st.dump(), "update: after");
    }

    fn refresh_instance(&self, changed: &Calendar, target: &str) {
        let key = target_key(target);

        let mut st = self.lock();
        let Some(cal) = st.by_target.get(&key).cloned() else {
            debug!(dispatcher = %self.name, calendar = %changed.key(), "update: target not registered");
            return;
        };
        if !std::ptr::eq(Arc::as_ptr(&cal), changed) {
            warn!(
                dispatcher = %self.name,
                calendar = %changed.key(),
                registered = %cal.key(),
                "update: edited calendar is not the registered instance"
            );
            return;
        }
        trace!(dispatcher = %self.name, state = %st.dump(), "update: before");

        st.drop_pending(&key);
        let (next, prev) = cal.read_points();
        if let Some(from) = next.or(prev) {
            st.queue_next(&self.name, &key, &cal, from);
        }
        info!(
            dispatcher = %self.name,
            calendar = %cal.key(),
            sequence = cal.sequence(),
            "calendar instance re-resolved"
        );
        trace!(dispatcher = %self.name, state = %st.dump(), "update: after");
    }

    // -----------------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------------

    /// Pop the earliest pending transition if it is due at `now`, and queue
    /// the same instance's next one. Call in a loop until `None` to drain.
    pub fn get_triggered(&self, now: DateTime<Utc>) -> Option<Transition> {
        let mut st = self.lock();
        let (at, key) = match st.queue.first_key_value() {
            Some((k, _)) if k.0 <= now => k.clone(),
            _ => return None,
        };
        let tr = st.queue.remove(&(at, key.clone()))?;
        st.by_calendar.remove(&key);

        if let Some(cal) = st.by_target.get(&key).cloned() {
            st.queue_next(&self.name, &key, &cal, at);
        }
        info!(dispatcher = %self.name, transition = %tr, "transition triggered");
        Some(tr)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Earliest pending transition, due or not.
    pub fn peek(&self) -> Option<Transition> {
        self.lock().queue.values().next().cloned()
    }

    pub fn pending(&self, target: &str) -> Option<Transition> {
        self.lock().by_calendar.get(&target_key(target)).cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Pending transitions in dispatch order.
    pub fn pending_snapshot(&self) -> Vec<Transition> {
        self.lock().queue.values().cloned().collect()
    }

    pub fn registered_len(&self) -> usize {
        self.lock().by_target.len()
    }

    pub fn instance(&self, target: &str) -> Option<Arc<Calendar>> {
        self.lock().by_target.get(&target_key(target)).cloned()
    }

    /// Targets registered for `id`, sorted.
    pub fn targets_using(&self, id: CalendarId) -> Vec<String> {
        let st = self.lock();
        let mut out: Vec<String> = st
            .by_id
            .get(&id)
            .map(|m| {
                m.iter()
                    .map(|(k, c)| c.target().unwrap_or_else(|| k.clone()))
                    .collect()
            })
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn diagnostic(&self) -> String {
        format!("{}:\n{}", self.name, self.lock().dump())
    }
}

impl CalendarObserver for Dispatcher {
    fn calendar_changed(&self, calendar: &Calendar) {
        self.update(calendar);
    }
}

impl DispatchState {
    /// Resolve and queue the next transition of `cal` strictly after `from`.
    fn queue_next(&mut self, dispatcher: &str, key: &str, cal: &Calendar, from: DateTime<Utc>) -> bool {
        if let Some(existing) = self.by_calendar.get(key) {
            warn!(
                dispatcher = %dispatcher,
                calendar = %cal.key(),
                pending = %existing,
                "transition already pending; request ignored"
            );
            return false;
        }
        let Some(tr) = cal.resolve_next(from) else {
            debug!(dispatcher = %dispatcher, calendar = %cal.key(), from = %from, "no further transition");
            return false;
        };
        let Some(at) = tr.at_utc() else {
            error!(dispatcher = %dispatcher, transition = %tr, "resolved transition is not dated");
            return false;
        };
        debug!(dispatcher = %dispatcher, transition = %tr, "transition queued");
        self.queue.insert((at, key.to_string()), tr.clone());
        self.by_calendar.insert(key.to_string(), tr);
        true
    }

    fn drop_pending(&mut self, key: &str) -> Option<Transition> {
        let tr = self.by_calendar.remove(key)?;
        if let Some(at) = tr.at_utc() {
            self.queue.remove(&(at, key.to_string()));
        }
        Some(tr)
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "  queue:");
        for ((at, key), tr) in &self.queue {
            let _ = writeln!(out, "    {at} {key} -> {tr}");
        }
        let _ = writeln!(out, "  by_calendar:");
        let mut pending: Vec<_> = self.by_calendar.iter().collect();
        pending.sort();
        for (key, tr) in pending {
            let _ = writeln!(out, "    {key} -> {tr}");
        }
        let _ = writeln!(out, "  by_target:");
        for (key, cal) in &self.by_target {
            let _ = writeln!(out, "    {key} -> {}", cal.key());
        }
        let _ = writeln!(out, "  by_id:");
        for (id, instances) in &self.by_id {
            let keys: Vec<&str> = instances.keys().map(String::as_str).collect();
            let _ = writeln!(out, "    {id} -> [{}]", keys.join(","));
        }
        out
    }
}
