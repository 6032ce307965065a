//! Rendering of engine prompts into Telegram messages.

use autoservice_core::{InfoPage, MonthView, Prompt, Slot};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, KeyboardRemove,
    ReplyMarkup,
};

use crate::config::Config;
use crate::intents::{
    BTN_ADD_BOOKING, BTN_BACK, BTN_CHANGE_PHONE, BTN_CONTACTS, BTN_LOCATION, BTN_MY_BOOKINGS,
    BTN_PRICES, BTN_RECORDS, CB_BACK, CB_IGNORE, CB_NEXT_MONTH, CB_NO, CB_PREV_MONTH, CB_YES,
};

const MONTHS: [&str; 12] = [
    "Январь", "Февраль", "Март", "Апрель", "Май", "Июнь",
    "Июль", "Август", "Сентябрь", "Октябрь", "Ноябрь", "Декабрь",
];
const MONTHS_GENITIVE: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня",
    "июля", "августа", "сентября", "октября", "ноября", "декабря",
];
const WEEKDAYS: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];

/// Who receives a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    User,
    Operator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text {
        text: String,
        markup: Option<ReplyMarkup>,
    },
    Photo {
        path: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: Audience,
    pub body: Body,
}

impl Outgoing {
    fn text(text: impl Into<String>) -> Self {
        Self {
            to: Audience::User,
            body: Body::Text {
                text: text.into(),
                markup: None,
            },
        }
    }

    fn with_markup(text: impl Into<String>, markup: impl Into<ReplyMarkup>) -> Self {
        Self {
            to: Audience::User,
            body: Body::Text {
                text: text.into(),
                markup: Some(markup.into()),
            },
        }
    }
}

pub fn render(prompt: &Prompt, config: &Config) -> Outgoing {
    match prompt {
        Prompt::ShowMainMenu => Outgoing::with_markup("Главное меню", main_menu()),
        Prompt::ShowRecordsMenu { profile } => Outgoing::with_markup(
            format!("Имя: {}\nТелефон: {}", profile.name, profile.phone),
            records_menu(),
        ),
        Prompt::ShowInfo { page } => render_info(*page, config),

        Prompt::AskName => Outgoing::with_markup(
            "Вы у нас впервые. Как к вам обращаться?",
            KeyboardRemove::new(),
        ),
        Prompt::AskPhone { name } => Outgoing::text(format!(
            "{name}, введите номер телефона для связи (только цифры)"
        )),
        Prompt::InvalidName => Outgoing::text("Имя не может быть пустым, попробуйте ещё раз"),
        Prompt::InvalidPhone => {
            Outgoing::text("Номер должен состоять только из цифр, попробуйте ещё раз")
        }
        Prompt::ConfirmRegistration { name, phone } => Outgoing::with_markup(
            format!("Проверьте данные:\nИмя: {name}\nТелефон: {phone}\n\nВсё верно?"),
            yes_no(),
        ),
        Prompt::RestartRegistration => Outgoing::text("Хорошо, начнём заново"),
        Prompt::Welcome => Outgoing::text("Вы зарегистрированы! Теперь можно записаться"),

        Prompt::ShowCalendar { view } => {
            Outgoing::with_markup("Выберите дату", calendar_keyboard(view))
        }
        Prompt::InvalidDay { day } => Outgoing::text(format!("В этом месяце нет {day}-го числа")),
        Prompt::PastDateRejected { date } => Outgoing::text(format!(
            "{} уже прошло, выберите другую дату",
            format_date_ru(*date)
        )),
        Prompt::ShowSlots { date, slots } if slots.is_empty() => Outgoing::with_markup(
            format!("На {} свободного времени нет", format_date_ru(*date)),
            slots_keyboard(slots),
        ),
        Prompt::ShowSlots { date, slots } => Outgoing::with_markup(
            format!("Свободное время на {}:", format_date_ru(*date)),
            slots_keyboard(slots),
        ),
        Prompt::ConfirmBooking { date, slot } => Outgoing::with_markup(
            format!("Записать вас на {} в {slot}?", format_date_ru(*date)),
            yes_no(),
        ),
        Prompt::SlotTaken { date, slot } => Outgoing::text(format!(
            "К сожалению, {} в {slot} уже заняли. Выберите другое время",
            format_date_ru(*date)
        )),
        Prompt::BookingSaved => Outgoing::with_markup("Вы записаны! Ждём вас", main_menu()),
        Prompt::NotifyOperator { at, name, phone } => Outgoing {
            to: Audience::Operator,
            body: Body::Text {
                text: format!(
                    "Новая запись\n{name}, {phone}\n{}",
                    format_instant_ru(*at)
                ),
                markup: None,
            },
        },

        Prompt::ShowBookings { bookings } => {
            let lines: Vec<String> = bookings.iter().map(|at| format_instant_ru(*at)).collect();
            Outgoing::text(format!("Ваши записи:\n{}", lines.join("\n")))
        }
        Prompt::NoBookings => Outgoing::text("У вас нет предстоящих записей"),

        Prompt::AskNewPhone => Outgoing::with_markup(
            "Введите новый номер телефона (только цифры)",
            KeyboardRemove::new(),
        ),
        Prompt::ConfirmPhoneChange { phone } => Outgoing::with_markup(
            format!("Новый номер: {phone}\nСохранить?"),
            yes_no(),
        ),
        Prompt::ResendPhone => Outgoing::text("Введите номер ещё раз"),
        Prompt::PhoneSaved => Outgoing::with_markup("Номер сохранён", main_menu()),

        Prompt::Cancelled => Outgoing::with_markup("Действие отменено", main_menu()),
        Prompt::SessionExpiredError => Outgoing::with_markup(
            "Время ожидания истекло, начните заново",
            main_menu(),
        ),
    }
}

fn render_info(page: InfoPage, config: &Config) -> Outgoing {
    let body = match page {
        InfoPage::Prices => Body::Photo {
            path: config.price_image.clone(),
        },
        InfoPage::Contacts => Body::Text {
            text: config.contacts_text.clone(),
            markup: None,
        },
        InfoPage::Location => Body::Location {
            latitude: config.location.0,
            longitude: config.location.1,
        },
    };
    Outgoing {
        to: Audience::User,
        body,
    }
}

/// Shown to the user when storage fails; the details go to the log.
pub fn storage_failure() -> Outgoing {
    Outgoing::text("Сервис временно недоступен, попробуйте позже")
}

// ── Keyboards ──

fn reply_keyboard(rows: &[&[&str]]) -> KeyboardMarkup {
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|label| KeyboardButton::new(*label)).collect::<Vec<_>>());
    KeyboardMarkup::new(rows).resize_keyboard()
}

fn main_menu() -> KeyboardMarkup {
    reply_keyboard(&[&[BTN_RECORDS, BTN_PRICES], &[BTN_CONTACTS, BTN_LOCATION]])
}

fn records_menu() -> KeyboardMarkup {
    reply_keyboard(&[
        &[BTN_ADD_BOOKING, BTN_MY_BOOKINGS],
        &[BTN_CHANGE_PHONE],
        &[BTN_BACK],
    ])
}

fn yes_no() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        InlineKeyboardButton::callback("Да", CB_YES),
        InlineKeyboardButton::callback("Нет", CB_NO),
    ]])
}

fn ignored(label: impl Into<String>) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, CB_IGNORE)
}

/// Month header, weekday row, one row per non-empty week, then the navigation row.
fn calendar_keyboard(view: &MonthView) -> InlineKeyboardMarkup {
    let month = view.month;
    let title = MONTHS
        .get(month.month() as usize - 1)
        .copied()
        .unwrap_or("?");

    let mut rows = vec![
        vec![ignored(format!("{title} {}", month.year()))],
        WEEKDAYS.iter().map(|d| ignored(*d)).collect(),
    ];
    for week in view.weeks() {
        rows.push(
            week.iter()
                .map(|&day| match day {
                    0 => ignored(" "),
                    d => InlineKeyboardButton::callback(d.to_string(), d.to_string()),
                })
                .collect(),
        );
    }
    rows.push(vec![
        InlineKeyboardButton::callback("<", CB_PREV_MONTH),
        ignored(" "),
        InlineKeyboardButton::callback(">", CB_NEXT_MONTH),
    ]);
    InlineKeyboardMarkup::new(rows)
}

/// Two slots per row, then a button back to the calendar.
fn slots_keyboard(slots: &[Slot]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = slots
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|slot| InlineKeyboardButton::callback(slot.label(), slot.label()))
                .collect()
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("Назад 👈", CB_BACK)]);
    InlineKeyboardMarkup::new(rows)
}

// ── Date formatting ──

fn format_date_ru(date: NaiveDate) -> String {
    let month = MONTHS_GENITIVE
        .get(date.month0() as usize)
        .copied()
        .unwrap_or("?");
    format!("{} {month} {}", date.day(), date.year())
}

fn format_instant_ru(at: DateTime<FixedOffset>) -> String {
    format!("{} в {}", format_date_ru(at.date_naive()), at.format("%H:%M"))
}

// ── Tests ──
