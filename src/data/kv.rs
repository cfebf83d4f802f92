//! Generic key-value persistence for application state across restarts.
//!
//! Backed by the `app_kv` table. Used for the price refresh status, its
//! last-run timestamp and summary, and any other small state that must
//! survive a restart.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

/// A stored value together with the time it was last written.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct KvEntry {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Retrieve an entry by key, or `None` if not present.
    async fn get_entry(&self, key: &str) -> Result<Option<KvEntry>>;

    /// Insert or update a key-value pair.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Atomically write `value` under `key` unless the key already holds
    /// `value` and was written less than `stale_after` ago.
    ///
    /// Returns `true` when this call performed the write.
    async fn claim(&self, key: &str, value: &str, stale_after: Duration) -> Result<bool>;

    /// Retrieve a value by key, or `None` if not present.
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Retrieve a persisted UTC timestamp, or `None` if absent or unparseable.
    async fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let value = self.get(key).await?;
        Ok(value.and_then(|v| DateTime::parse_from_rfc3339(&v).ok().map(|dt| dt.to_utc())))
    }

    /// Persist a UTC timestamp under the given key.
    async fn set_timestamp(&self, key: &str, ts: DateTime<Utc>) -> Result<()> {
        self.set(key, &ts.to_rfc3339()).await
    }
}

/// [`KvStore`] over the Postgres `app_kv` table.
#[derive(Clone)]
pub struct PgKv {
    pool: PgPool,
}

impl PgKv {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for PgKv {
    async fn get_entry(&self, key: &str) -> Result<Option<KvEntry>> {
        sqlx::query_as::<_, KvEntry>("SELECT value, updated_at FROM app_kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read app_kv key {key}"))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_kv (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write app_kv key {key}"))?;
        Ok(())
    }

    async fn claim(&self, key: &str, value: &str, stale_after: Duration) -> Result<bool> {
        // The conditional DO UPDATE makes the check and the write one statement;
        // a losing writer gets no row back.
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO app_kv (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            WHERE app_kv.value <> EXCLUDED.value
               OR app_kv.updated_at < now() - make_interval(secs => $3)
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(stale_after.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to claim app_kv key {key}"))?;

        Ok(claimed.is_some())
    }
}
