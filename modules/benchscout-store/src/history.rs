//! Notification history: how many times each canonical URL has been surfaced
//! to the chat channel. No TTL — once a URL hits the threshold it stays
//! suppressed.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use benchscout_common::canonicalize_url;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notification_history (
    url_key TEXT PRIMARY KEY,
    notify_count INTEGER NOT NULL DEFAULT 0,
    first_notified TEXT,
    last_notified TEXT,
    title TEXT
)";

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .context("failed to open notification history database")?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn notify_count(&self, url: &str) -> Result<u32> {
        let url_key = canonicalize_url(url);
        if url_key.is_empty() {
            return Ok(0);
        }
        let row = sqlx::query("SELECT notify_count FROM notification_history WHERE url_key = ?")
            .bind(&url_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("notify_count") as u32).unwrap_or(0))
    }

    /// Counts for a batch of URLs, keyed by canonical URL. URLs never seen
    /// map to zero.
    pub async fn counts_for(&self, urls: &[String]) -> Result<HashMap<String, u32>> {
        let mut counts = HashMap::new();
        for url in urls {
            let key = canonicalize_url(url);
            if key.is_empty() {
                continue;
            }
            let count = self.notify_count(url).await?;
            counts.insert(key, count);
        }
        Ok(counts)
    }

    /// Record one push for a URL, inserting the row on first sight.
    /// Returns the new count.
    pub async fn increment(&self, url: &str, title: Option<&str>) -> Result<u32> {
        let url_key = canonicalize_url(url);
        if url_key.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().to_rfc3339();

        let existing =
            sqlx::query("SELECT notify_count FROM notification_history WHERE url_key = ?")
                .bind(&url_key)
                .fetch_optional(&self.pool)
                .await?;

        let new_count = match existing {
            Some(row) => {
                let count: i64 = row.get("notify_count");
                let new_count = count + 1;
                sqlx::query(
                    "UPDATE notification_history
                     SET notify_count = ?, last_notified = ?, title = COALESCE(?, title)
                     WHERE url_key = ?",
                )
                .bind(new_count)
                .bind(&now)
                .bind(title)
                .bind(&url_key)
                .execute(&self.pool)
                .await?;
                new_count as u32
            }
            None => {
                sqlx::query(
                    "INSERT INTO notification_history
                     (url_key, notify_count, first_notified, last_notified, title)
                     VALUES (?, 1, ?, ?, ?)",
                )
                .bind(&url_key)
                .bind(&now)
                .bind(&now)
                .bind(title.unwrap_or(""))
                .execute(&self.pool)
                .await?;
                1
            }
        };
        Ok(new_count)
    }

    pub async fn tracked_total(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM notification_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_url_has_zero_count() {
        let store = HistoryStore::in_memory().await.unwrap();
        assert_eq!(store.notify_count("https://example.com/x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_inserts_then_updates() {
        let store = HistoryStore::in_memory().await.unwrap();
        let url = "https://arxiv.org/abs/2401.00001";
        assert_eq!(store.increment(url, Some("Paper")).await.unwrap(), 1);
        assert_eq!(store.increment(url, None).await.unwrap(), 2);
        assert_eq!(store.increment(url, None).await.unwrap(), 3);
        assert_eq!(store.notify_count(url).await.unwrap(), 3);
        assert_eq!(store.tracked_total().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn count_keyed_by_canonical_url() {
        let store = HistoryStore::in_memory().await.unwrap();
        store
            .increment("https://arxiv.org/abs/2401.00001v1", Some("Paper"))
            .await
            .unwrap();
        // A different version of the same paper shares the count.
        assert_eq!(
            store
                .notify_count("https://arxiv.org/abs/2401.00001v2")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn counts_for_batch() {
        let store = HistoryStore::in_memory().await.unwrap();
        store.increment("https://a.com/1", None).await.unwrap();
        let counts = store
            .counts_for(&["https://a.com/1".into(), "https://a.com/2".into()])
            .await
            .unwrap();
        assert_eq!(counts.get("https://a.com/1"), Some(&1));
        assert_eq!(counts.get("https://a.com/2"), Some(&0));
    }
}
