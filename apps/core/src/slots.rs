use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// One bookable time-of-day, stored as minutes after business midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    minutes: u16,
}

/// Daily schedule: 8 slots, 90 minutes apart, 09:00 through 19:30.
pub const SLOT_TEMPLATE: [Slot; 8] = [
    Slot::at(9, 0),
    Slot::at(10, 30),
    Slot::at(12, 0),
    Slot::at(13, 30),
    Slot::at(15, 0),
    Slot::at(16, 30),
    Slot::at(18, 0),
    Slot::at(19, 30),
];

impl Slot {
    const fn at(hour: u16, minute: u16) -> Self {
        Self {
            minutes: hour * 60 + minute,
        }
    }

    /// Resolve an "HH:MM" label to a template entry. Anything else is not a slot.
    pub fn parse(label: &str) -> Option<Slot> {
        SLOT_TEMPLATE
            .iter()
            .copied()
            .find(|slot| slot.label() == label.trim())
    }

    /// Offset from business midnight.
    pub fn offset(self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.minutes))
    }

    pub fn time(self) -> NaiveTime {
        NaiveTime::MIN + self.offset()
    }

    pub fn label(self) -> String {
        format!("{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }

    /// Absolute instant of this slot on `date`, where `date` is a business date.
    pub fn on(self, date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
        business_midnight(date, offset) + self.offset()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Serialized as its "HH:MM" label.
impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The instant at which `date` begins in business time.
pub fn business_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

// ── Tests ──
