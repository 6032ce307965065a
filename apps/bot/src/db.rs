use anyhow::Context;
use async_trait::async_trait;
use autoservice_core::{Booking, ConversationId, Phone, Storage, UserProfile};
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '001_init'")
            .fetch_one(pool)
            .await?;

    if !applied {
        let migration_sql = include_str!("../migrations/001_init.sql");
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(pool)
                    .await
                    .with_context(|| format!("migration 001_init failed at: {trimmed}"))?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ('001_init')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 001_init");
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

/// `Storage` backed by SQLite. Booking instants are stored as unix seconds.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_instants(rows: Vec<i64>) -> anyhow::Result<Vec<DateTime<Utc>>> {
    rows.into_iter()
        .map(|secs| {
            DateTime::from_timestamp(secs, 0)
                .with_context(|| format!("stored booking time {secs} is out of range"))
        })
        .collect()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn user_exists(&self, user: ConversationId) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM users WHERE user_id = ?")
            .bind(user.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn get_user(&self, user: ConversationId) -> anyhow::Result<UserProfile> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT name, phone FROM users WHERE user_id = ?")
                .bind(user.0)
                .fetch_optional(&self.pool)
                .await?;
        let (name, phone) = row.with_context(|| format!("user {user} not found"))?;
        Ok(UserProfile {
            id: user,
            name,
            phone: Phone::parse(&phone)
                .with_context(|| format!("user {user} has a malformed phone"))?,
        })
    }

    async fn save_user(&self, profile: &UserProfile) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (user_id, name, phone) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET name = excluded.name, phone = excluded.phone",
        )
        .bind(profile.id.0)
        .bind(&profile.name)
        .bind(profile.phone.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_phone(&self, user: ConversationId, phone: &Phone) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE users SET phone = ? WHERE user_id = ?")
            .bind(phone.as_str())
            .bind(user.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("user {user} not found");
        }
        Ok(())
    }

    async fn save_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO bookings (user_id, starts_at) VALUES (?, ?)")
            .bind(booking.user.0)
            .bind(booking.starts_at.timestamp())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to save booking at {}", booking.starts_at))?;
        Ok(())
    }

    async fn list_future_bookings(
        &self,
        user: ConversationId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DateTime<Utc>>> {
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT starts_at FROM bookings WHERE user_id = ? AND starts_at > ?
             ORDER BY starts_at ASC",
        )
        .bind(user.0)
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;
        to_instants(rows)
    }

    async fn list_bookings_in_window(
        &self,
        start: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DateTime<Utc>>> {
        let end = start + TimeDelta::hours(24);
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT starts_at FROM bookings WHERE starts_at >= ? AND starts_at < ?
             ORDER BY starts_at ASC",
        )
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await?;
        to_instants(rows)
    }
}

// ── Tests ──
