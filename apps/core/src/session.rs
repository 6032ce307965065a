use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::models::ConversationId;

/// How long a value stays visible after being set.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// How often expired entries are physically evicted.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// What a session entry is for. Each purpose holds exactly one value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Registration: entered name (text).
    Name,
    /// Registration: entered phone (text).
    Phone,
    /// Month currently on screen, as its first day (date).
    CalendarMonth,
    /// Booking: picked day (date).
    ChosenDate,
    /// Booking: picked day + slot (instant).
    ChosenDateTime,
    /// Phone change: new number awaiting confirmation (text).
    PendingPhone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub conversation: ConversationId,
    pub purpose: Purpose,
}

impl SessionKey {
    pub fn new(conversation: ConversationId, purpose: Purpose) -> Self {
        Self {
            conversation,
            purpose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValue {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: SessionValue,
    expires_at: DateTime<Utc>,
}

/// Per-conversation scratch data with a bounded lifetime.
///
/// Shared by every conversation; keys carry the conversation id so conversations never
/// see each other's values. A read after expiry is a plain miss.
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<DashMap<SessionKey, Entry>>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, DEFAULT_TTL)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
            ttl: to_delta(ttl),
        }
    }

    pub fn set(&self, key: SessionKey, value: SessionValue) {
        self.set_with_ttl(key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, key: SessionKey, value: SessionValue, ttl: TimeDelta) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(key, Entry { value, expires_at });
    }

    pub fn get(&self, key: SessionKey) -> Option<SessionValue> {
        let now = self.clock.now();
        self.entries
            .get(&key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn date(&self, key: SessionKey) -> Option<NaiveDate> {
        match self.get(key)? {
            SessionValue::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn instant(&self, key: SessionKey) -> Option<DateTime<Utc>> {
        match self.get(key)? {
            SessionValue::Instant(at) => Some(at),
            _ => None,
        }
    }

    pub fn text(&self, key: SessionKey) -> Option<String> {
        match self.get(key)? {
            SessionValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn remove(&self, key: SessionKey) {
        self.entries.remove(&key);
    }

    /// Drop every entry belonging to `conversation`.
    pub fn clear_conversation(&self, conversation: ConversationId) {
        self.entries
            .retain(|key, _| key.conversation != conversation);
    }

    /// Evict expired entries; returns how many were dropped.
    /// Call periodically from a background task.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::days(365))
}

// ── Tests ──
