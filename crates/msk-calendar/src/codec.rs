//! JSON document format for calendars, day schedules and transitions.
//!
//! Field names are those of the stored documents:
//!
//! ```text
//! Calendar    {"Name","TZ","DefWkSchd","S_DSLookup","Specific","RepYearly"}
//! Week        {"Name","Wk_DSLookup","WkSch":[{"Day":0..6,"DSName"}]}
//! Entry       {"DSName","DS"}
//! Day         {"Name","SCs"}
//! Transition  {"O"?,"S","T"}
//! ```
//!
//! Encoding is deterministic (catalogs by name, weekdays by index, dates
//! ascending). Decoding is all-or-nothing; the target and the persistent id
//! are never part of a document.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::error;

use crate::{
    weekday_from_index, weekday_index, Calendar, DaySchedule, MonthDay, TimeZoneSpec, Transition,
    WeekPattern, INVALID_STATE,
};

const DATE_FMT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransitionDoc {
    #[serde(rename = "O", default, skip_serializing_if = "Option::is_none")]
    owner: Option<String>,
    #[serde(rename = "S")]
    state: i32,
    #[serde(rename = "T")]
    time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DayDoc {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "SCs", default)]
    transitions: Vec<TransitionDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryDoc {
    #[serde(rename = "DSName")]
    ds_name: String,
    #[serde(rename = "DS")]
    ds: DayDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeekdayDoc {
    #[serde(rename = "Day")]
    day: u8,
    #[serde(rename = "DSName")]
    ds_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeekDoc {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Wk_DSLookup", default)]
    lookup: Vec<EntryDoc>,
    #[serde(rename = "WkSch", default)]
    schedule: Vec<WeekdayDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpecificDoc {
    #[serde(rename = "SpecDate")]
    date: String,
    #[serde(rename = "DSName")]
    ds_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct YearlyDoc {
    #[serde(rename = "RepDate")]
    date: String,
    #[serde(rename = "DSName")]
    ds_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalendarDoc {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "TZ", default)]
    tz: String,
    #[serde(rename = "DefWkSchd")]
    week: WeekDoc,
    #[serde(rename = "S_DSLookup", default)]
    lookup: Vec<EntryDoc>,
    #[serde(rename = "Specific", default)]
    specific: Vec<SpecificDoc>,
    #[serde(rename = "RepYearly", default)]
    yearly: Vec<YearlyDoc>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn encode(cal: &Calendar) -> String {
    to_json(&calendar_doc(cal))
}

pub fn decode(json: &str) -> Result<Calendar> {
    let doc: CalendarDoc = serde_json::from_str(json).context("calendar document is not valid")?;
    calendar_from_doc(doc)
}

pub fn encode_transition(tr: &Transition) -> String {
    to_json(&transition_doc(tr))
}

pub fn decode_transition(json: &str) -> Result<Transition> {
    let doc: TransitionDoc =
        serde_json::from_str(json).context("transition document is not valid")?;
    transition_from_doc(&doc)
}

pub fn encode_day(ds: &DaySchedule) -> String {
    to_json(&day_doc(ds))
}

pub fn decode_day(json: &str) -> Result<DaySchedule> {
    let doc: DayDoc = serde_json::from_str(json).context("day schedule document is not valid")?;
    day_from_doc(&doc)
}

fn to_json<T: Serialize>(doc: &T) -> String {
    // Plain structs with string keys: serialization cannot fail.
    serde_json::to_string(doc).unwrap_or_else(|e| {
        error!(error = %e, "document serialization failed");
        String::new()
    })
}

// ---------------------------------------------------------------------------
// Model -> document
// ---------------------------------------------------------------------------

fn transition_doc(tr: &Transition) -> TransitionDoc {
    TransitionDoc {
        owner: tr.owner().map(str::to_string),
        state: tr.state(),
        time: tr.time_text(),
    }
}

fn day_doc(ds: &DaySchedule) -> DayDoc {
    DayDoc {
        name: ds.name().to_string(),
        transitions: ds.transitions().map(transition_doc).collect(),
    }
}

fn entries(catalog: &BTreeMap<String, DaySchedule>) -> Vec<EntryDoc> {
    catalog
        .iter()
        .map(|(name, ds)| EntryDoc {
            ds_name: name.clone(),
            ds: day_doc(ds),
        })
        .collect()
}

fn week_doc(week: &WeekPattern) -> WeekDoc {
    WeekDoc {
        name: week.name().to_string(),
        lookup: entries(week.catalog()),
        schedule: week
            .assignments()
            .map(|(day, name)| WeekdayDoc {
                day: weekday_index(day),
                ds_name: name.to_string(),
            })
            .collect(),
    }
}

fn calendar_doc(cal: &Calendar) -> CalendarDoc {
    CalendarDoc {
        name: cal.name(),
        tz: cal.timezone().id().to_string(),
        week: week_doc(&cal.week_pattern()),
        lookup: entries(&cal.override_catalog()),
        specific: cal
            .specific_overrides()
            .into_iter()
            .map(|(date, ds_name)| SpecificDoc {
                date: date.format(DATE_FMT).to_string(),
                ds_name,
            })
            .collect(),
        yearly: cal
            .yearly_overrides()
            .into_iter()
            .map(|(day, ds_name)| YearlyDoc {
                date: format!("0000-{day}"),
                ds_name,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Document -> model
// ---------------------------------------------------------------------------

fn transition_from_doc(doc: &TransitionDoc) -> Result<Transition> {
    if doc.state == INVALID_STATE {
        bail!("transition at {:?} carries the invalid state", doc.time);
    }
    let tr = Transition::parse(&doc.time, doc.state)
        .with_context(|| format!("unparsable transition time {:?}", doc.time))?;
    Ok(tr.with_owner(doc.owner.as_deref()))
}

fn day_from_doc(doc: &DayDoc) -> Result<DaySchedule> {
    let mut ds = DaySchedule::new(doc.name.clone());
    for t in &doc.transitions {
        let tr = transition_from_doc(t).with_context(|| format!("day schedule {:?}", doc.name))?;
        if !ds.add(tr) {
            bail!("day schedule {:?}: duplicate transition time {:?}", doc.name, t.time);
        }
    }
    Ok(ds)
}

/// Catalog keyed by `DSName`. A schedule whose own name differs from its key
/// takes the key.
fn catalog_from_entries(entries: &[EntryDoc], what: &str) -> Result<BTreeMap<String, DaySchedule>> {
    let mut catalog = BTreeMap::new();
    for entry in entries {
        let mut ds = day_from_doc(&entry.ds)?;
        if ds.name() != entry.ds_name {
            ds.set_name(entry.ds_name.clone());
        }
        if catalog.insert(entry.ds_name.clone(), ds).is_some() {
            bail!("{what}: duplicate day schedule name {:?}", entry.ds_name);
        }
    }
    Ok(catalog)
}

fn week_from_doc(doc: &WeekDoc) -> Result<WeekPattern> {
    let mut week = WeekPattern::new(doc.name.clone());
    for ds in catalog_from_entries(&doc.lookup, "Wk_DSLookup")?.into_values() {
        week.catalog_insert(ds);
    }

    let mut seen: BTreeSet<u8> = BTreeSet::new();
    for binding in &doc.schedule {
        let day: Weekday = weekday_from_index(binding.day)
            .with_context(|| format!("weekday index {} out of range 0..6", binding.day))?;
        if !seen.insert(binding.day) {
            bail!("weekday index {} bound twice", binding.day);
        }
        if !week.use_schedule(day, &binding.ds_name) {
            error!(week = %doc.name, weekday = binding.day, schedule = %binding.ds_name,
                "weekday bound to unknown day schedule; binding skipped");
        }
    }
    Ok(week)
}

fn calendar_from_doc(doc: CalendarDoc) -> Result<Calendar> {
    let week = week_from_doc(&doc.week).context("DefWkSchd")?;
    let catalog = catalog_from_entries(&doc.lookup, "S_DSLookup")?;

    let mut specific = BTreeMap::new();
    for s in &doc.specific {
        let date = NaiveDate::parse_from_str(s.date.trim(), DATE_FMT)
            .with_context(|| format!("unparsable SpecDate {:?}", s.date))?;
        if specific.insert(date, s.ds_name.clone()).is_some() {
            bail!("SpecDate {} listed twice", date);
        }
    }

    let mut yearly = BTreeMap::new();
    for y in &doc.yearly {
        let day = MonthDay::parse(&y.date)
            .with_context(|| format!("unparsable RepDate {:?}", y.date))?;
        if yearly.insert(day, y.ds_name.clone()).is_some() {
            bail!("RepDate {} listed twice", day);
        }
    }

    let tz = TimeZoneSpec::resolve(&doc.tz);
    Ok(Calendar::assemble(doc.name, tz, week, catalog, yearly, specific))
}
