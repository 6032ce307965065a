//! Tracing layer that forwards ERROR events to the operator chat.
//!
//! Sends are throttled: at most one per `MIN_INTERVAL`, and a message identical to one sent
//! within `DEDUP_WINDOW` is dropped. Delivery is spawned onto the runtime so logging never
//! waits on the network.

use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const MIN_INTERVAL: Duration = Duration::from_secs(10);
const DEDUP_WINDOW: Duration = Duration::from_secs(60);

// ── Throttle ──

/// Rate limit plus deduplication by message hash.
#[derive(Debug)]
struct Throttle {
    last_sent: Option<Instant>,
    recent: Vec<(u64, Instant)>,
}

impl Throttle {
    fn new() -> Self {
        Self {
            last_sent: None,
            recent: Vec::new(),
        }
    }

    /// Records the send when it is allowed.
    fn should_send(&mut self, hash: u64, now: Instant) -> bool {
        self.recent
            .retain(|(_, at)| now.saturating_duration_since(*at) < DEDUP_WINDOW);

        if self.recent.iter().any(|(h, _)| *h == hash) {
            return false;
        }
        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < MIN_INTERVAL {
                return false;
            }
        }
        self.last_sent = Some(now);
        self.recent.push((hash, now));
        true
    }
}

fn hash_of(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

// ── Layer ──

pub struct OperatorLayer {
    send_url: String,
    chat_id: i64,
    http: reqwest::Client,
    throttle: Mutex<Throttle>,
}

impl OperatorLayer {
    pub fn new(bot_token: &str, chat_id: i64) -> Self {
        Self {
            send_url: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id,
            http: reqwest::Client::new(),
            throttle: Mutex::new(Throttle::new()),
        }
    }
}

fn alert_text(summary: &str, target: &str, location: &str) -> String {
    let at = chrono::Utc::now().format("%d.%m %H:%M:%S UTC");
    format!(
        "\u{26a0}\u{fe0f} <b>Ошибка бота</b>\n\
         <code>{}</code>\n\
         {target} ({location})\n\
         {at}",
        escape_html(summary)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl<S: Subscriber> Layer<S> for OperatorLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() != Level::ERROR {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);
        let summary = fields.summary();

        let allowed = self
            .throttle
            .lock()
            .map(|mut t| t.should_send(hash_of(&summary), Instant::now()))
            .unwrap_or(false);
        if !allowed {
            return;
        }

        let location = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.to_string(),
            _ => "?".to_string(),
        };
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": alert_text(&summary, meta.target(), &location),
            "parse_mode": "HTML",
        });
        let request = self.http.post(&self.send_url).json(&body);

        // Outside a runtime there is nowhere to deliver; the fmt layer still has the event.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = request.send().await;
            });
        }
    }
}

// ── Field visitor ──

/// The `message` field plus every other field as `key=value`.
#[derive(Default)]
struct EventFields {
    message: String,
    extra: String,
}

impl EventFields {
    fn push(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if name == "message" {
            let _ = self.message.write_fmt(value);
            return;
        }
        if !self.extra.is_empty() {
            self.extra.push_str(", ");
        }
        let _ = write!(self.extra, "{name}={value}");
    }

    fn summary(&self) -> String {
        match (self.message.is_empty(), self.extra.is_empty()) {
            (_, true) => self.message.clone(),
            (true, false) => self.extra.clone(),
            (false, false) => format!("{} ({})", self.message, self.extra),
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format_args!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field.name(), format_args!("{value}"));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field.name(), format_args!("{value}"));
    }
}

// ── Tests ──
