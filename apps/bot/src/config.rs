use anyhow::Context;
use chrono::FixedOffset;

const DEFAULT_DATABASE_URL: &str = "sqlite:autoservice.db?mode=rwc";
const DEFAULT_CONTACTS: &str = "Номера телефонов:\n+7XXXXXXXXXX\n\nМы ВК: https://vk.com/";
/// Moscow time, matching the business' wall clock.
const DEFAULT_OFFSET_HOURS: i32 = 3;

/// Process configuration, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub operator_chat_id: i64,
    pub database_url: String,
    pub business_offset: FixedOffset,
    pub contacts_text: String,
    pub price_image: String,
    pub location: (f64, f64),
    pub notify_errors: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bot_token = get("BOT_TOKEN").context("BOT_TOKEN must be set")?;
        let operator_chat_id = get("OPERATOR_CHAT_ID")
            .context("OPERATOR_CHAT_ID must be set")?
            .trim()
            .parse()
            .context("OPERATOR_CHAT_ID must be a number")?;

        let offset_hours: i32 = match get("BUSINESS_UTC_OFFSET_HOURS") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("BUSINESS_UTC_OFFSET_HOURS must be a whole number of hours")?,
            None => DEFAULT_OFFSET_HOURS,
        };
        let business_offset = FixedOffset::east_opt(offset_hours * 3600)
            .context("BUSINESS_UTC_OFFSET_HOURS is out of range")?;

        let lat = parse_or(&get, "LOCATION_LAT", 55.754029)?;
        let lon = parse_or(&get, "LOCATION_LON", 37.620743)?;
        let notify_errors = parse_or(&get, "NOTIFY_ERRORS", true)?;

        Ok(Self {
            bot_token,
            operator_chat_id,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            business_offset,
            contacts_text: get("CONTACTS_TEXT").unwrap_or_else(|| DEFAULT_CONTACTS.into()),
            price_image: get("PRICE_IMAGE").unwrap_or_else(|| "img/price.jpg".into()),
            location: (lat, lon),
            notify_errors,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

// ── Tests ──
