use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::clock::Clock;
use crate::error::Result;
use crate::slots::{business_midnight, Slot, SLOT_TEMPLATE};
use crate::storage::Storage;

/// Template slots still bookable on `date`, in template order.
///
/// A slot is taken when an existing booking sits on exactly its instant. When `date` is
/// today (business time) slots at or before the current time-of-day are dropped too, and a
/// date already behind us has nothing left. An empty result is a valid answer.
pub fn compute_free_slots(
    date: NaiveDate,
    booked: &[DateTime<Utc>],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<Slot> {
    let local_now = now.with_timezone(&offset);
    let today = local_now.date_naive();
    if date < today {
        return Vec::new();
    }
    let elapsed = local_now.time() - NaiveTime::MIN;

    SLOT_TEMPLATE
        .iter()
        .copied()
        .filter(|slot| !booked.contains(&slot.on(date, offset)))
        .filter(|slot| date != today || slot.offset() > elapsed)
        .collect()
}

/// Fetch the bookings for `date`'s business day and compute what is left.
pub async fn free_slots_for_date(
    storage: &dyn Storage,
    clock: &dyn Clock,
    date: NaiveDate,
) -> Result<Vec<Slot>> {
    let offset = clock.offset();
    let booked = storage
        .list_bookings_in_window(business_midnight(date, offset))
        .await?;
    let free = compute_free_slots(date, &booked, clock.now(), offset);
    tracing::debug!(%date, booked = booked.len(), free = free.len(), "computed free slots");
    Ok(free)
}

// ── Tests ──
