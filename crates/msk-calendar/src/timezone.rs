//! Fixed-offset timezone binding for calendars.
//!
//! A calendar is bound to an IANA zone id, but only the zone's *base* UTC
//! offset (standard time, DST excluded) is used to move between UTC and
//! calendar-local time. Daylight saving is ignored as a known approximation:
//! on a transition day the local civil day is 23 or 25 hours long, so a
//! narrow window of transitions can be missed or re-triggered.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};
use tracing::warn;

/// 2020-01-01T00:00:00Z. Base offsets are sampled here so that resolution
/// never depends on the wall clock.
const REFERENCE_EPOCH_SECS: i64 = 1_577_836_800;

pub const UTC_ID: &str = "UTC";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeZoneSpec {
    id: String,
    base_offset: FixedOffset,
}

impl Default for TimeZoneSpec {
    fn default() -> Self {
        Self::utc()
    }
}

impl TimeZoneSpec {
    pub fn utc() -> Self {
        Self {
            id: UTC_ID.to_string(),
            base_offset: Utc.fix(),
        }
    }

    /// Resolve an IANA zone id. `None` for blank or unknown ids.
    pub fn try_resolve(id: &str) -> Option<Self> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        let tz: Tz = id.parse().ok()?;
        let reference = Utc.timestamp_opt(REFERENCE_EPOCH_SECS, 0).single()?;
        let base = tz
            .offset_from_utc_datetime(&reference.naive_utc())
            .base_utc_offset();
        let base_offset = FixedOffset::east_opt(i32::try_from(base.num_seconds()).ok()?)?;
        Some(Self {
            id: tz.name().to_string(),
            base_offset,
        })
    }

    /// Resolve an IANA zone id, falling back to UTC for blank or unknown ids.
    pub fn resolve(id: &str) -> Self {
        match Self::try_resolve(id) {
            Some(spec) => spec,
            None => {
                warn!(tz = %id, "unknown timezone id; falling back to UTC");
                Self::utc()
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn base_offset(&self) -> FixedOffset {
        self.base_offset
    }

    pub fn offset_seconds(&self) -> i64 {
        i64::from(self.base_offset.local_minus_utc())
    }

    pub(crate) fn offset(&self) -> Duration {
        Duration::seconds(self.offset_seconds())
    }

    /// UTC -> calendar-local civil time (fixed offset, no DST).
    pub fn to_local(&self, utc: DateTime<Utc>) -> Option<NaiveDateTime> {
        utc.naive_utc().checked_add_signed(self.offset())
    }

    /// Calendar-local civil time -> UTC (fixed offset, no DST).
    pub fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        local
            .checked_sub_signed(self.offset())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}
