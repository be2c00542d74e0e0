//! Master calendar registry.
//!
//! ```text
//! persistent id  ->  master calendar (untargeted template)
//! ```
//!
//! Masters are shared as `Arc<Calendar>` so administrative edits can be made
//! on them in place. Consumers never resolve against a master directly: they
//! take a [`CalendarRegistry::targeted_copy`], an isolated deep copy bound to
//! one target.
//!
//! The registry is an explicitly constructed object; there is no process-wide
//! instance.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::{codec, Calendar, CalendarId};

#[derive(Debug, Default)]
pub struct CalendarRegistry {
    masters: Mutex<BTreeMap<CalendarId, Arc<Calendar>>>,
}

impl CalendarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<CalendarId, Arc<Calendar>>> {
        self.masters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `cal` as the master for `id`, stamping the id and clearing any
    /// target. Returns the master it replaced. Invalid ids are ignored.
    pub fn insert(&self, id: CalendarId, cal: Calendar) -> Option<Arc<Calendar>> {
        if !id.is_valid() {
            warn!(id = %id, calendar = %cal.name(), "registry insert with invalid id ignored");
            return None;
        }
        let master = Arc::new(cal.master_copy().with_id(id));
        info!(calendar = %master.key(), "master calendar registered");
        self.lock().insert(id, master)
    }

    /// Decode a stored document and insert it under `id`.
    pub fn insert_encoded(&self, id: CalendarId, json: &str) -> Result<()> {
        if !id.is_valid() {
            bail!("calendar id {id} is not positive");
        }
        let cal = codec::decode(json)?;
        self.insert(id, cal);
        Ok(())
    }

    /// Shared handle on the master itself. Edits through it notify whoever
    /// follows the master.
    pub fn master(&self, id: CalendarId) -> Option<Arc<Calendar>> {
        self.lock().get(&id).cloned()
    }

    /// Untargeted deep copy of the master.
    pub fn master_copy(&self, id: CalendarId) -> Option<Calendar> {
        self.master(id).map(|m| m.master_copy())
    }

    /// Deep copy of the master bound to `target`. `None` for an unknown id or
    /// a blank target.
    pub fn targeted_copy(&self, id: CalendarId, target: &str) -> Option<Calendar> {
        if target.trim().is_empty() {
            warn!(id = %id, "targeted copy requested with a blank target");
            return None;
        }
        let master = self.master(id)?;
        Some(master.targeted_copy(target))
    }

    pub fn exists(&self, id: CalendarId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn name_of(&self, id: CalendarId) -> Option<String> {
        self.master(id).map(|m| m.name())
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<CalendarId> {
        self.lock().keys().copied().collect()
    }

    /// Shallow copy of the id -> master map.
    pub fn snapshot(&self) -> BTreeMap<CalendarId, Arc<Calendar>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
