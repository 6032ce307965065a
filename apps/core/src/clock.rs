use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};
use std::sync::Mutex;

/// Source of "now" plus the fixed offset that turns server time into business time.
///
/// Every component that compares against the current moment (availability cutoff,
/// calendar navigation, session expiry) reads it from the same clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn offset(&self) -> FixedOffset;

    fn business_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&self.offset())
    }

    fn business_today(&self) -> NaiveDate {
        self.business_now().date_naive()
    }
}

/// Wall clock with a fixed business offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Clock that only moves when told to. Used to drive expiry and same-day rules in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msk() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_business_date_rolls_over_before_utc() {
        // 22:30 UTC is already 01:30 next day at UTC+3
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 0).unwrap(), msk());
        assert_eq!(
            clock.business_today(),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
    }

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start, msk());
        clock.advance(TimeDelta::minutes(90));
        assert_eq!(clock.now(), start + TimeDelta::minutes(90));
    }

    #[test]
    fn test_system_clock_keeps_offset() {
        let clock = SystemClock::new(msk());
        assert_eq!(clock.business_now().offset(), &msk());
    }
}
