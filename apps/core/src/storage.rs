use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::{Booking, ConversationId, Phone, UserProfile};

/// Persistence the engine depends on. Every failure is reported as `anyhow::Error` and
/// surfaces from the engine as `EngineError::StorageUnavailable`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn user_exists(&self, user: ConversationId) -> anyhow::Result<bool>;

    /// Not-found is an error.
    async fn get_user(&self, user: ConversationId) -> anyhow::Result<UserProfile>;

    async fn save_user(&self, profile: &UserProfile) -> anyhow::Result<()>;

    async fn update_phone(&self, user: ConversationId, phone: &Phone) -> anyhow::Result<()>;

    async fn save_booking(&self, booking: &Booking) -> anyhow::Result<()>;

    /// Bookings of `user` strictly after `now`, ascending.
    async fn list_future_bookings(
        &self,
        user: ConversationId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DateTime<Utc>>>;

    /// All booking instants in `[start, start + 24h)`, ascending.
    async fn list_bookings_in_window(&self, start: DateTime<Utc>)
        -> anyhow::Result<Vec<DateTime<Utc>>>;
}

// ── In-memory backend ──

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<ConversationId, UserProfile>,
    bookings: Vec<Booking>,
    saved_users: Vec<UserProfile>,
}

/// `Storage` kept in process memory. Can be switched into a failing mode to simulate an
/// unavailable backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every profile passed to `save_user`, in call order.
    pub fn saved_users(&self) -> Vec<UserProfile> {
        self.lock().saved_users.clone()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().bookings.clone()
    }

    pub fn user(&self, id: ConversationId) -> Option<UserProfile> {
        self.lock().users.get(&id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("memory storage switched off");
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn user_exists(&self, user: ConversationId) -> anyhow::Result<bool> {
        self.check_available()?;
        Ok(self.lock().users.contains_key(&user))
    }

    async fn get_user(&self, user: ConversationId) -> anyhow::Result<UserProfile> {
        self.check_available()?;
        self.lock()
            .users
            .get(&user)
            .cloned()
            .ok_or_else(|| anyhow!("user {} not found", user))
    }

    async fn save_user(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.check_available()?;
        let mut tables = self.lock();
        tables.users.insert(profile.id, profile.clone());
        tables.saved_users.push(profile.clone());
        Ok(())
    }

    async fn update_phone(&self, user: ConversationId, phone: &Phone) -> anyhow::Result<()> {
        self.check_available()?;
        let mut tables = self.lock();
        let profile = tables
            .users
            .get_mut(&user)
            .ok_or_else(|| anyhow!("user {} not found", user))?;
        profile.phone = phone.clone();
        Ok(())
    }

    async fn save_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        self.check_available()?;
        let mut tables = self.lock();
        if tables.bookings.iter().any(|b| b.starts_at == booking.starts_at) {
            bail!("slot {} is already booked", booking.starts_at);
        }
        tables.bookings.push(booking.clone());
        Ok(())
    }

    async fn list_future_bookings(
        &self,
        user: ConversationId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DateTime<Utc>>> {
        self.check_available()?;
        let mut found: Vec<_> = self
            .lock()
            .bookings
            .iter()
            .filter(|b| b.user == user && b.starts_at > now)
            .map(|b| b.starts_at)
            .collect();
        found.sort();
        Ok(found)
    }

    async fn list_bookings_in_window(
        &self,
        start: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DateTime<Utc>>> {
        self.check_available()?;
        let end = start + TimeDelta::hours(24);
        let mut found: Vec<_> = self
            .lock()
            .bookings
            .iter()
            .filter(|b| b.starts_at >= start && b.starts_at < end)
            .map(|b| b.starts_at)
            .collect();
        found.sort();
        Ok(found)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    fn booking(user: i64, starts_at: DateTime<Utc>) -> Booking {
        Booking {
            user: ConversationId(user),
            starts_at,
        }
    }

    #[tokio::test]
    async fn test_window_is_half_open() {
        let storage = MemoryStorage::new();
        let start = at(0, 0);
        storage.save_booking(&booking(1, start)).await.unwrap();
        storage
            .save_booking(&booking(1, start + TimeDelta::hours(24)))
            .await
            .unwrap();
        let found = storage.list_bookings_in_window(start).await.unwrap();
        assert_eq!(found, vec![start]);
    }

    #[tokio::test]
    async fn test_future_bookings_exclude_now_and_other_users() {
        let storage = MemoryStorage::new();
        storage.save_booking(&booking(1, at(9, 0))).await.unwrap();
        storage.save_booking(&booking(1, at(12, 0))).await.unwrap();
        storage.save_booking(&booking(2, at(15, 0))).await.unwrap();
        let found = storage
            .list_future_bookings(ConversationId(1), at(9, 0))
            .await
            .unwrap();
        assert_eq!(found, vec![at(12, 0)]);
    }

    #[tokio::test]
    async fn test_duplicate_instant_rejected() {
        let storage = MemoryStorage::new();
        storage.save_booking(&booking(1, at(9, 0))).await.unwrap();
        assert!(storage.save_booking(&booking(2, at(9, 0))).await.is_err());
        assert_eq!(storage.bookings().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_user_is_error() {
        let storage = MemoryStorage::new();
        assert!(storage.get_user(ConversationId(5)).await.is_err());
        assert!(!storage.user_exists(ConversationId(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true);
        assert!(storage.user_exists(ConversationId(1)).await.is_err());
        assert!(storage.list_bookings_in_window(at(0, 0)).await.is_err());
        storage.set_unavailable(false);
        assert!(storage.user_exists(ConversationId(1)).await.is_ok());
    }
}
