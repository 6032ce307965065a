use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

use crate::error::ValidationError;

/// A calendar month. Ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(YearMonth),
    /// Navigation refused; carries the unchanged month.
    Rejected(YearMonth),
}

impl Navigation {
    pub fn month(self) -> YearMonth {
        match self {
            Navigation::Moved(ym) | Navigation::Rejected(ym) => ym,
        }
    }
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn is_leap_year(self) -> bool {
        NaiveDate::from_ymd_opt(self.year, 2, 29).is_some()
    }

    pub fn days(self) -> u32 {
        match self.month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ if self.is_leap_year() => 29,
            _ => 28,
        }
    }

    /// Date of `day` in this month, if it exists.
    pub fn day(self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    pub fn first_day(self) -> NaiveDate {
        // only misses beyond chrono's representable years
        self.day(1).unwrap_or(NaiveDate::MAX)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Rendered month: 6 weeks × 7 days, Monday first, 0 for blank cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthView {
    pub month: YearMonth,
    pub grid: [[u32; 7]; 6],
}

impl MonthView {
    /// Rows that hold at least one day.
    pub fn weeks(&self) -> impl Iterator<Item = &[u32; 7]> {
        self.grid.iter().filter(|row| row.iter().any(|&d| d != 0))
    }
}

pub fn render_month(month: YearMonth) -> MonthView {
    let lead = month.first_day().weekday().num_days_from_monday();
    let mut grid = [[0u32; 7]; 6];
    for day in 1..=month.days() {
        let cell = (lead + day - 1) as usize;
        grid[cell / 7][cell % 7] = day;
    }
    MonthView { month, grid }
}

/// Move the calendar. Going back past the current month is refused; forward is unbounded.
pub fn navigate(month: YearMonth, direction: Direction, today: NaiveDate) -> Navigation {
    match direction {
        Direction::Next => Navigation::Moved(month.next()),
        Direction::Previous => {
            let target = month.previous();
            if target < YearMonth::of(today) {
                Navigation::Rejected(month)
            } else {
                Navigation::Moved(target)
            }
        }
    }
}

/// Resolve a tapped day in the displayed month. Today and later are accepted.
pub fn validate_day(
    month: YearMonth,
    day: u32,
    today: NaiveDate,
) -> Result<NaiveDate, ValidationError> {
    let date = month.day(day).ok_or(ValidationError::DayOutOfRange {
        year: month.year(),
        month: month.month(),
        day,
    })?;
    if date < today {
        return Err(ValidationError::PastDate(date));
    }
    Ok(date)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_month() {
        assert!(YearMonth::new(2026, 0).is_none());
        assert!(YearMonth::new(2026, 13).is_none());
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(ym(2026, 1).days(), 31);
        assert_eq!(ym(2026, 4).days(), 30);
        assert_eq!(ym(2026, 2).days(), 28);
        assert_eq!(ym(2024, 2).days(), 29);
        assert_eq!(ym(2000, 2).days(), 29);
        assert_eq!(ym(1900, 2).days(), 28);
    }

    #[test]
    fn test_year_wraps() {
        assert_eq!(ym(2026, 12).next(), ym(2027, 1));
        assert_eq!(ym(2027, 1).previous(), ym(2026, 12));
    }

    #[test]
    fn test_grid_monday_aligned() {
        // 2026-06-01 is a Monday
        let view = render_month(ym(2026, 6));
        assert_eq!(view.grid[0], [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(view.grid[4], [29, 30, 0, 0, 0, 0, 0]);
        assert_eq!(view.grid[5], [0; 7]);
        assert_eq!(view.weeks().count(), 5);
    }

    #[test]
    fn test_grid_sunday_start_uses_last_column() {
        // 2026-03-01 is a Sunday
        let view = render_month(ym(2026, 3));
        assert_eq!(view.grid[0], [0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(view.grid[5], [30, 31, 0, 0, 0, 0, 0]);
        assert_eq!(view.weeks().count(), 6);
    }

    #[test]
    fn test_grid_leap_february() {
        // 2028-02-01 is a Tuesday
        let view = render_month(ym(2028, 2));
        assert_eq!(view.grid[0][1], 1);
        assert_eq!(view.grid[4][1], 29);
        let count = view.grid.iter().flatten().filter(|&&d| d != 0).count();
        assert_eq!(count, 29);
    }

    #[test]
    fn test_previous_from_current_month_rejected() {
        let today = d(2026, 10, 16);
        assert_eq!(
            navigate(ym(2026, 10), Direction::Previous, today),
            Navigation::Rejected(ym(2026, 10))
        );
    }

    #[test]
    fn test_previous_back_to_current_month_allowed() {
        let today = d(2026, 10, 16);
        assert_eq!(
            navigate(ym(2026, 11), Direction::Previous, today),
            Navigation::Moved(ym(2026, 10))
        );
    }

    #[test]
    fn test_previous_across_year_compares_whole_month() {
        // Same month number a year later is still ahead of today
        let today = d(2026, 10, 16);
        assert_eq!(
            navigate(ym(2027, 10), Direction::Previous, today).month(),
            ym(2027, 9)
        );
    }

    #[test]
    fn test_next_is_unbounded() {
        let today = d(2026, 10, 16);
        assert_eq!(
            navigate(ym(2030, 12), Direction::Next, today),
            Navigation::Moved(ym(2031, 1))
        );
    }

    #[test]
    fn test_yesterday_is_past() {
        let today = d(2026, 10, 16);
        assert_eq!(
            validate_day(ym(2026, 10), 15, today),
            Err(ValidationError::PastDate(d(2026, 10, 15)))
        );
    }

    #[test]
    fn test_today_is_accepted() {
        let today = d(2026, 10, 16);
        assert_eq!(validate_day(ym(2026, 10), 16, today), Ok(today));
    }

    #[test]
    fn test_first_of_month_yesterday_across_boundary() {
        let today = d(2026, 11, 1);
        assert!(matches!(
            validate_day(ym(2026, 10), 31, today),
            Err(ValidationError::PastDate(_))
        ));
    }

    #[test]
    fn test_day_out_of_range() {
        let today = d(2026, 10, 16);
        assert_eq!(
            validate_day(ym(2026, 11), 31, today),
            Err(ValidationError::DayOutOfRange {
                year: 2026,
                month: 11,
                day: 31
            })
        );
    }
}
