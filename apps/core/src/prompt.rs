use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::calendar::MonthView;
use crate::intent::InfoPage;
use crate::models::{Phone, UserProfile};
use crate::slots::Slot;

/// What the transport should show. Everything the engine says goes through here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    ShowMainMenu,
    ShowRecordsMenu { profile: UserProfile },
    ShowInfo { page: InfoPage },
    AskName,
    AskPhone { name: String },
    InvalidName,
    InvalidPhone,
    ConfirmRegistration { name: String, phone: Phone },
    RestartRegistration,
    Welcome,
    ShowCalendar { view: MonthView },
    InvalidDay { day: u32 },
    PastDateRejected { date: NaiveDate },
    ShowSlots { date: NaiveDate, slots: Vec<Slot> },
    ConfirmBooking { date: NaiveDate, slot: Slot },
    SlotTaken { date: NaiveDate, slot: Slot },
    BookingSaved,
    /// Goes to the operator channel, not to the user.
    NotifyOperator {
        at: DateTime<FixedOffset>,
        name: String,
        phone: Phone,
    },
    ShowBookings { bookings: Vec<DateTime<FixedOffset>> },
    NoBookings,
    AskNewPhone,
    ConfirmPhoneChange { phone: Phone },
    ResendPhone,
    PhoneSaved,
    Cancelled,
    SessionExpiredError,
}

impl Prompt {
    pub fn is_operator(&self) -> bool {
        matches!(self, Prompt::NotifyOperator { .. })
    }
}

// ── Tests ──
