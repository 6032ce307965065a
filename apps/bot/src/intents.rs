//! Mapping of Telegram input onto engine intents.
//!
//! Reply-keyboard buttons arrive as plain text, so their labels are reserved words here;
//! everything else typed by the user is free text. Inline buttons carry short callback data.
//! Only private chats are conversations; the operator group never drives the engine.

use autoservice_core::{InfoPage, Intent, Slot};
use teloxide::types::Chat;

pub const BTN_RECORDS: &str = "Запись 📃";
pub const BTN_PRICES: &str = "Прайс лист 💵";
pub const BTN_CONTACTS: &str = "Наши контакты ☎";
pub const BTN_LOCATION: &str = "Мы на картах 🗺️";
pub const BTN_ADD_BOOKING: &str = "Добавить запись 📝";
pub const BTN_CHANGE_PHONE: &str = "Изменить номер телефона 📱";
pub const BTN_MY_BOOKINGS: &str = "Ваши записи 📜";
pub const BTN_BACK: &str = "Назад 👈";

pub const CB_YES: &str = "yes";
pub const CB_NO: &str = "no";
pub const CB_PREV_MONTH: &str = "prev_month";
pub const CB_NEXT_MONTH: &str = "next_month";
pub const CB_IGNORE: &str = "nothing";
pub const CB_BACK: &str = "back";

pub fn is_conversation_chat(chat: &Chat) -> bool {
    chat.is_private()
}

/// Text of an incoming message. Known commands are handled before this; any other command
/// is dropped so it never reaches a flow as typed input.
pub fn from_text(text: &str) -> Option<Intent> {
    let trimmed = text.trim();
    if trimmed.starts_with('/') {
        return None;
    }
    let intent = match trimmed {
        BTN_RECORDS => Intent::RecordsMenu,
        BTN_PRICES => Intent::Info(InfoPage::Prices),
        BTN_CONTACTS => Intent::Info(InfoPage::Contacts),
        BTN_LOCATION => Intent::Info(InfoPage::Location),
        BTN_ADD_BOOKING => Intent::AddBooking,
        BTN_CHANGE_PHONE => Intent::ChangePhone,
        BTN_MY_BOOKINGS => Intent::MyBookings,
        BTN_BACK => Intent::Back,
        _ => Intent::Text(text.to_string()),
    };
    Some(intent)
}

/// Data of an inline button press. `None` for data this bot never produces.
pub fn from_callback(data: &str) -> Option<Intent> {
    match data {
        CB_PREV_MONTH => Some(Intent::PrevMonth),
        CB_NEXT_MONTH => Some(Intent::NextMonth),
        CB_IGNORE => Some(Intent::Ignore),
        CB_BACK => Some(Intent::Back),
        _ => Intent::confirmation(data)
            .or_else(|| Intent::day(data))
            .or_else(|| Slot::parse(data).map(Intent::Slot)),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_buttons() {
        assert_eq!(from_text("Запись 📃"), Some(Intent::RecordsMenu));
        assert_eq!(
            from_text("Мы на картах 🗺️"),
            Some(Intent::Info(InfoPage::Location))
        );
        assert_eq!(from_text(" Назад 👈 "), Some(Intent::Back));
        assert_eq!(from_text(BTN_CHANGE_PHONE), Some(Intent::ChangePhone));
    }

    #[test]
    fn test_free_text_is_kept_verbatim() {
        assert_eq!(from_text(" Anna "), Some(Intent::Text(" Anna ".into())));
        assert_eq!(from_text("5551234"), Some(Intent::Text("5551234".into())));
    }

    #[test]
    fn test_unknown_commands_are_not_text() {
        assert_eq!(from_text("/help"), None);
        assert_eq!(from_text(" /settings now"), None);
        assert_eq!(from_text("/start@some_bot"), None);
        // a slash inside the text is fine
        assert_eq!(from_text("Anna/Ann"), Some(Intent::Text("Anna/Ann".into())));
    }

    fn chat(value: serde_json::Value) -> Chat {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_only_private_chats_are_conversations() {
        let private = chat(serde_json::json!({
            "id": 42,
            "type": "private",
            "first_name": "Anna",
        }));
        let group = chat(serde_json::json!({
            "id": -1001234567890i64,
            "type": "supergroup",
            "title": "Operators",
        }));
        let small_group = chat(serde_json::json!({
            "id": -42,
            "type": "group",
            "title": "Operators",
        }));
        assert!(is_conversation_chat(&private));
        assert!(!is_conversation_chat(&group));
        assert!(!is_conversation_chat(&small_group));
    }

    #[test]
    fn test_callbacks() {
        assert_eq!(from_callback("yes"), Some(Intent::Yes));
        assert_eq!(from_callback("no"), Some(Intent::No));
        assert_eq!(from_callback("prev_month"), Some(Intent::PrevMonth));
        assert_eq!(from_callback("nothing"), Some(Intent::Ignore));
        assert_eq!(from_callback("back"), Some(Intent::Back));
        assert_eq!(from_callback("17"), Some(Intent::Day(17)));
        assert_eq!(
            from_callback("09:00"),
            Slot::parse("09:00").map(Intent::Slot)
        );
        assert!(from_callback("09:00").is_some());
    }

    #[test]
    fn test_unknown_callbacks_dropped() {
        assert_eq!(from_callback("32"), None);
        assert_eq!(from_callback("09:30"), None);
        assert_eq!(from_callback("cancel:5"), None);
    }
}
