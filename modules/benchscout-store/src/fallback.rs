//! Embedded SQLite fallback store. Rows land here whenever the primary grid
//! is unreachable or rejects a batch, and migrate back on the next healthy run.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use benchscout_common::{canonicalize_url, ScoredCandidate};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS candidates (
    url_key TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    source TEXT NOT NULL,
    url TEXT NOT NULL,
    payload TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)";

#[derive(Clone)]
pub struct FallbackStore {
    pool: SqlitePool,
}

impl FallbackStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .context("failed to open fallback database")?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert candidates as unsynced rows. Canonical URL is the unique key;
    /// rows already present are left untouched.
    pub async fn save(&self, candidates: &[ScoredCandidate]) -> Result<usize> {
        let mut inserted = 0;
        let now = Utc::now().to_rfc3339();
        for candidate in candidates {
            let url_key = canonicalize_url(&candidate.raw.url);
            if url_key.is_empty() {
                warn!(title = %candidate.raw.title, "fallback save skipped row without usable URL");
                continue;
            }
            let payload = serde_json::to_string(candidate)?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO candidates
                 (url_key, title, source, url, payload, synced, created_at)
                 VALUES (?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(&url_key)
            .bind(&candidate.raw.title)
            .bind(candidate.raw.source.to_string())
            .bind(&candidate.raw.url)
            .bind(&payload)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        info!(inserted, total = candidates.len(), "fallback rows written");
        Ok(inserted)
    }

    /// Rows that have not yet reached the primary store.
    pub async fn unsynced(&self) -> Result<Vec<ScoredCandidate>> {
        let rows = sqlx::query("SELECT payload FROM candidates WHERE synced = 0")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.get("payload");
            match serde_json::from_str(&payload) {
                Ok(candidate) => out.push(candidate),
                Err(e) => warn!(error = %e, "undeserializable fallback row skipped"),
            }
        }
        Ok(out)
    }

    pub async fn mark_synced(&self, url_keys: &[String]) -> Result<usize> {
        let mut updated = 0;
        for key in url_keys {
            let result = sqlx::query("UPDATE candidates SET synced = 1 WHERE url_key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            updated += result.rows_affected() as usize;
        }
        Ok(updated)
    }

    /// Delete synced rows older than the retention window.
    pub async fn purge_synced(&self, retention_days: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();
        let result = sqlx::query("DELETE FROM candidates WHERE synced = 1 AND created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn synced_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM candidates WHERE synced = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn unsynced_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM candidates WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Backdate a row's created_at (test helper for retention logic).
    #[doc(hidden)]
    pub async fn set_created_at(&self, url_key: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE candidates SET created_at = ? WHERE url_key = ?")
            .bind(at.to_rfc3339())
            .bind(url_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchscout_common::{RawCandidate, ScoreSet, ScoreWeights, Source};

    fn candidate(url: &str) -> ScoredCandidate {
        let raw = RawCandidate::new("A benchmark title", url, Source::Github);
        let scores = ScoreSet {
            activity: 7.0,
            reproducibility: 7.0,
            license: 7.0,
            novelty: 7.0,
            relevance: 7.0,
            ..ScoreSet::default()
        };
        ScoredCandidate::from_parts(raw, scores, &ScoreWeights::default())
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let store = FallbackStore::in_memory().await.unwrap();
        let inserted = store
            .save(&[candidate("https://github.com/a/b"), candidate("https://github.com/c/d")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let pending = store.unsynced().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].raw.title, "A benchmark title");
        assert!((pending[0].total_score - 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn duplicate_urls_ignored() {
        let store = FallbackStore::in_memory().await.unwrap();
        store.save(&[candidate("https://github.com/a/b")]).await.unwrap();
        let second = store
            .save(&[candidate("https://github.com/A/B/")])
            .await
            .unwrap();
        // Same canonical URL, so the second insert is a no-op.
        assert_eq!(second, 0);
        assert_eq!(store.unsynced_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_synced_transitions_rows() {
        let store = FallbackStore::in_memory().await.unwrap();
        store.save(&[candidate("https://github.com/a/b")]).await.unwrap();
        let key = canonicalize_url("https://github.com/a/b");
        let updated = store.mark_synced(&[key]).await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.unsynced_count().await.unwrap(), 0);
        assert_eq!(store.synced_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_old_synced_rows() {
        let store = FallbackStore::in_memory().await.unwrap();
        store
            .save(&[candidate("https://github.com/old/synced"), candidate("https://github.com/new/unsynced")])
            .await
            .unwrap();
        let old_key = canonicalize_url("https://github.com/old/synced");
        store.mark_synced(&[old_key.clone()]).await.unwrap();
        store
            .set_created_at(&old_key, Utc::now() - Duration::days(10))
            .await
            .unwrap();

        let purged = store.purge_synced(7).await.unwrap();
        assert_eq!(purged, 1);
        // The fresh unsynced row survives.
        assert_eq!(store.unsynced_count().await.unwrap(), 1);
    }
}
