//! Primary-with-fallback storage coordination. `save` guarantees every
//! candidate lands in the grid or the fallback table; `backfill` migrates
//! fallback rows forward when the grid recovers.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use benchscout_common::constants::FALLBACK_RETENTION_DAYS;
use benchscout_common::{canonicalize_url, ScoredCandidate};

use crate::fallback::FallbackStore;
use crate::grid::{GridError, GridSaveOutcome, GridStore};

/// Seam over the primary store so tests can stand in a fake grid.
#[async_trait]
pub trait GridBackend: Send + Sync {
    async fn save(
        &self,
        candidates: Vec<ScoredCandidate>,
        now: DateTime<Utc>,
    ) -> Result<GridSaveOutcome, GridError>;

    async fn recent_url_keys(&self, now: DateTime<Utc>) -> Result<HashSet<String>, GridError>;
}

#[async_trait]
impl GridBackend for GridStore {
    async fn save(
        &self,
        candidates: Vec<ScoredCandidate>,
        now: DateTime<Utc>,
    ) -> Result<GridSaveOutcome, GridError> {
        GridStore::save(self, candidates, now).await
    }

    async fn recent_url_keys(&self, now: DateTime<Utc>) -> Result<HashSet<String>, GridError> {
        GridStore::recent_url_keys(self, now).await
    }
}

#[derive(Debug, Default, Clone)]
pub struct SaveReport {
    pub primary_saved: usize,
    pub fallback_saved: usize,
    pub skipped_existing: usize,
}

pub struct StorageManager {
    grid: Arc<dyn GridBackend>,
    fallback: FallbackStore,
}

impl StorageManager {
    pub fn new(grid: Arc<dyn GridBackend>, fallback: FallbackStore) -> Self {
        Self { grid, fallback }
    }

    /// Persist candidates, primary preferred. Whole-grid failures and failed
    /// batches divert to the fallback store so nothing is silently dropped.
    pub async fn save(&self, candidates: Vec<ScoredCandidate>) -> Result<SaveReport> {
        if candidates.is_empty() {
            return Ok(SaveReport::default());
        }

        let now = Utc::now();
        match self.grid.save(candidates.clone(), now).await {
            Ok(outcome) => {
                let mut report = SaveReport {
                    primary_saved: outcome.saved.len(),
                    skipped_existing: outcome.skipped_existing.len(),
                    ..SaveReport::default()
                };
                if !outcome.failed.is_empty() {
                    report.fallback_saved = self.fallback.save(&outcome.failed).await?;
                    warn!(
                        diverted = outcome.failed.len(),
                        "grid rejected batches, contents preserved in fallback"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "primary store unavailable, diverting whole save to fallback");
                let written = self.fallback.save(&candidates).await?;
                Ok(SaveReport {
                    fallback_saved: written,
                    ..SaveReport::default()
                })
            }
        }
    }

    /// Push previously-unsynced fallback rows to the grid. Rows saved (or
    /// found already present upstream) flip to synced; the rest stay put for
    /// the next run.
    pub async fn backfill(&self) -> Result<usize> {
        let pending = self.fallback.unsynced().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!(pending = pending.len(), "backfilling fallback rows to primary");

        let now = Utc::now();
        match self.grid.save(pending, now).await {
            Ok(outcome) => {
                let mut keys: Vec<String> = outcome
                    .saved
                    .iter()
                    .map(|c| canonicalize_url(&c.raw.url))
                    .filter(|k| !k.is_empty())
                    .collect();
                keys.extend(outcome.skipped_existing.iter().cloned());
                let synced = self.fallback.mark_synced(&keys).await?;
                info!(synced, "fallback rows migrated to primary");
                Ok(synced)
            }
            Err(e) => {
                warn!(error = %e, "backfill skipped, primary still unavailable");
                Ok(0)
            }
        }
    }

    /// Existing canonical URLs in the primary store, used by the run-level
    /// dedup stage. A grid outage degrades to an empty set.
    pub async fn existing_url_keys(&self) -> HashSet<String> {
        match self.grid.recent_url_keys(Utc::now()).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "could not read existing rows, dedup degraded to empty set");
                HashSet::new()
            }
        }
    }

    /// Drop synced fallback rows past retention.
    pub async fn purge(&self) -> Result<u64> {
        let purged = self.fallback.purge_synced(FALLBACK_RETENTION_DAYS).await?;
        if purged > 0 {
            info!(purged, "purged expired fallback rows");
        }
        Ok(purged)
    }

    pub fn fallback(&self) -> &FallbackStore {
        &self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchscout_common::{RawCandidate, ScoreSet, ScoreWeights, Source};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    fn candidate(url: &str) -> ScoredCandidate {
        let raw = RawCandidate::new("Some benchmark", url, Source::Github);
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

    /// Fake grid: either accepts everything or fails every call.
    struct FakeGrid {
        healthy: AtomicBool,
        stored: Mutex<Vec<String>>,
    }

    impl FakeGrid {
        fn new(healthy: bool) -> Self {
            Self {
                healthy: AtomicBool::new(healthy),
                stored: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GridBackend for FakeGrid {
        async fn save(
            &self,
            candidates: Vec<ScoredCandidate>,
            _now: DateTime<Utc>,
        ) -> Result<GridSaveOutcome, GridError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(GridError::Request("HTTP 500".into()));
            }
            let mut stored = self.stored.lock().await;
            let mut outcome = GridSaveOutcome::default();
            for candidate in candidates {
                let key = canonicalize_url(&candidate.raw.url);
                if stored.contains(&key) {
                    outcome.skipped_existing.push(key);
                } else {
                    stored.push(key);
                    outcome.saved.push(candidate);
                }
            }
            Ok(outcome)
        }

        async fn recent_url_keys(
            &self,
            _now: DateTime<Utc>,
        ) -> Result<HashSet<String>, GridError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(GridError::Request("HTTP 500".into()));
            }
            Ok(self.stored.lock().await.iter().cloned().collect())
        }
    }

    #[tokio::test]
    async fn healthy_grid_takes_all_rows() {
        let grid = Arc::new(FakeGrid::new(true));
        let manager = StorageManager::new(grid, FallbackStore::in_memory().await.unwrap());
        let report = manager
            .save(vec![candidate("https://github.com/a/1"), candidate("https://github.com/a/2")])
            .await
            .unwrap();
        assert_eq!(report.primary_saved, 2);
        assert_eq!(report.fallback_saved, 0);
        assert_eq!(manager.fallback().unsynced_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn outage_diverts_whole_save_to_fallback() {
        // Primary returns 500 for all attempts: zero grid rows, all rows in
        // fallback with synced=false.
        let grid = Arc::new(FakeGrid::new(false));
        let manager = StorageManager::new(grid, FallbackStore::in_memory().await.unwrap());
        let inputs: Vec<_> = (0..40)
            .map(|i| candidate(&format!("https://github.com/org/repo{i}")))
            .collect();
        let report = manager.save(inputs).await.unwrap();
        assert_eq!(report.primary_saved, 0);
        assert_eq!(report.fallback_saved, 40);
        assert_eq!(manager.fallback().unsynced_count().await.unwrap(), 40);
    }

    #[tokio::test]
    async fn recovery_backfills_and_marks_synced() {
        let grid = Arc::new(FakeGrid::new(false));
        let manager =
            StorageManager::new(grid.clone(), FallbackStore::in_memory().await.unwrap());
        let inputs: Vec<_> = (0..5)
            .map(|i| candidate(&format!("https://github.com/org/repo{i}")))
            .collect();
        manager.save(inputs).await.unwrap();
        assert_eq!(manager.fallback().unsynced_count().await.unwrap(), 5);

        // Primary recovers; the next run's backfill migrates every row.
        grid.healthy.store(true, Ordering::SeqCst);
        let synced = manager.backfill().await.unwrap();
        assert_eq!(synced, 5);
        assert_eq!(manager.fallback().unsynced_count().await.unwrap(), 0);
        assert_eq!(manager.fallback().synced_count().await.unwrap(), 5);
        assert_eq!(grid.stored.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn backfill_marks_upstream_duplicates_synced() {
        let grid = Arc::new(FakeGrid::new(true));
        // Seed the grid with a row that also sits in fallback.
        grid.stored
            .lock()
            .await
            .push(canonicalize_url("https://github.com/dup/row"));
        let manager =
            StorageManager::new(grid.clone(), FallbackStore::in_memory().await.unwrap());
        manager
            .fallback()
            .save(&[candidate("https://github.com/dup/row")])
            .await
            .unwrap();

        let synced = manager.backfill().await.unwrap();
        assert_eq!(synced, 1);
        assert_eq!(manager.fallback().unsynced_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn save_never_loses_rows_under_partial_failure() {
        // Invariant: after save, each input is in exactly one store.
        let grid = Arc::new(FakeGrid::new(true));
        let manager = StorageManager::new(grid.clone(), FallbackStore::in_memory().await.unwrap());
        let inputs: Vec<_> = (0..3)
            .map(|i| candidate(&format!("https://github.com/org/p{i}")))
            .collect();
        let report = manager.save(inputs).await.unwrap();
        let in_grid = grid.stored.lock().await.len();
        let in_fallback = manager.fallback().unsynced_count().await.unwrap() as usize;
        assert_eq!(in_grid + in_fallback, 3);
        assert_eq!(report.primary_saved + report.fallback_saved, 3);
    }
}
