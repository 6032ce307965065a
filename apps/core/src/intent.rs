use serde::Serialize;

use crate::slots::Slot;

/// Static information pages reachable from the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoPage {
    Prices,
    Contacts,
    Location,
}

/// A normalized user input. The transport filters raw updates down to these; anything it
/// cannot map is dropped before reaching the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Intent {
    /// `/start`
    Start,
    /// `/cancel`
    Cancel,
    /// Free text typed by the user (never a command).
    Text(String),
    Yes,
    No,
    RecordsMenu,
    Back,
    MyBookings,
    AddBooking,
    ChangePhone,
    Info(InfoPage),
    PrevMonth,
    NextMonth,
    /// Tap on a calendar header or blank cell.
    Ignore,
    Day(u32),
    Slot(Slot),
}

impl Intent {
    /// Interpret a yes/no answer.
    pub fn confirmation(answer: &str) -> Option<Intent> {
        match answer {
            "yes" => Some(Intent::Yes),
            "no" => Some(Intent::No),
            _ => None,
        }
    }

    /// Calendar days are 1..=31; whether the day exists in the shown month is decided later.
    pub fn day(raw: &str) -> Option<Intent> {
        raw.parse::<u32>()
            .ok()
            .filter(|d| (1..=31).contains(d))
            .map(Intent::Day)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation() {
        assert_eq!(Intent::confirmation("yes"), Some(Intent::Yes));
        assert_eq!(Intent::confirmation("no"), Some(Intent::No));
        assert_eq!(Intent::confirmation("maybe"), None);
    }

    #[test]
    fn test_day_bounds() {
        assert_eq!(Intent::day("1"), Some(Intent::Day(1)));
        assert_eq!(Intent::day("31"), Some(Intent::Day(31)));
        assert_eq!(Intent::day("0"), None);
        assert_eq!(Intent::day("32"), None);
        assert_eq!(Intent::day("-1"), None);
        assert_eq!(Intent::day("x"), None);
    }

    #[test]
    fn test_intent_serializes_tagged() {
        let json = serde_json::to_value(Intent::Day(5)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "day", "value": 5}));
    }
}
