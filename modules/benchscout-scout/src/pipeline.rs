//! The eight-stage orchestrator. Stages run in strict order; a stage failure
//! is logged and the next stage proceeds with whatever the previous stage
//! produced. Errors aggregate into counters, never as exceptions past this
//! module.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use benchscout_common::{canonicalize_url, Priority, RawCandidate, ScoredCandidate};
use benchscout_store::{SaveReport, StorageManager};

use crate::collectors::Collector;
use crate::enhancer::Enhance;
use crate::notifier::NotificationSink;
use crate::prefilter::Prefilter;
use crate::run_log::{EventKind, RunLog};
use crate::scorer::CandidateScorer;

/// Storage seam: the manager's surface the orchestrator needs.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn backfill(&self) -> Result<usize>;
    async fn save(&self, candidates: Vec<ScoredCandidate>) -> Result<SaveReport>;
    async fn existing_url_keys(&self) -> HashSet<String>;
    async fn purge(&self) -> Result<u64>;
}

#[async_trait]
impl CandidateStore for StorageManager {
    async fn backfill(&self) -> Result<usize> {
        StorageManager::backfill(self).await
    }

    async fn save(&self, candidates: Vec<ScoredCandidate>) -> Result<SaveReport> {
        StorageManager::save(self, candidates).await
    }

    async fn existing_url_keys(&self) -> HashSet<String> {
        StorageManager::existing_url_keys(self).await
    }

    async fn purge(&self) -> Result<u64> {
        StorageManager::purge(self).await
    }
}

/// Counters for one pipeline run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub collected_by_source: BTreeMap<String, usize>,
    pub collector_errors: u32,
    pub collected_total: usize,
    pub deduped_in_run: usize,
    pub deduped_existing: usize,
    pub prefilter_input: usize,
    pub prefilter_output: usize,
    pub enhanced: usize,
    pub scored: usize,
    pub dropped_low: usize,
    pub saved_primary: usize,
    pub saved_fallback: usize,
    pub skipped_existing: usize,
    pub backfilled: usize,
    pub notify_cards: usize,
    pub notify_suppressed: usize,
    pub stage_errors: u32,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Run Complete ===")?;
        writeln!(f, "Collected:        {}", self.collected_total)?;
        for (source, count) in &self.collected_by_source {
            writeln!(f, "  {source:<18} {count}")?;
        }
        writeln!(f, "Collector errors: {}", self.collector_errors)?;
        writeln!(
            f,
            "Deduplicated:     {} in-run, {} already stored",
            self.deduped_in_run, self.deduped_existing
        )?;
        writeln!(
            f,
            "Prefilter:        {} -> {}",
            self.prefilter_input, self.prefilter_output
        )?;
        writeln!(f, "Enhanced:         {}", self.enhanced)?;
        writeln!(f, "Scored:           {}", self.scored)?;
        writeln!(f, "Dropped (low):    {}", self.dropped_low)?;
        writeln!(
            f,
            "Saved:            {} primary, {} fallback, {} skipped",
            self.saved_primary, self.saved_fallback, self.skipped_existing
        )?;
        writeln!(f, "Backfilled:       {}", self.backfilled)?;
        writeln!(
            f,
            "Notified:         {} cards, {} suppressed",
            self.notify_cards, self.notify_suppressed
        )?;
        writeln!(f, "Stage errors:     {}", self.stage_errors)?;
        Ok(())
    }
}

pub struct Pipeline {
    collectors: Vec<Box<dyn Collector>>,
    prefilter: Prefilter,
    enhancer: Option<Box<dyn Enhance>>,
    scorer: Box<dyn CandidateScorer>,
    storage: Box<dyn CandidateStore>,
    notifier: Box<dyn NotificationSink>,
    run_log: RunLog,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collectors: Vec<Box<dyn Collector>>,
        prefilter: Prefilter,
        enhancer: Option<Box<dyn Enhance>>,
        scorer: Box<dyn CandidateScorer>,
        storage: Box<dyn CandidateStore>,
        notifier: Box<dyn NotificationSink>,
        run_log: RunLog,
    ) -> Self {
        Self {
            collectors,
            prefilter,
            enhancer,
            scorer,
            storage,
            notifier,
            run_log,
        }
    }

    /// Build a pipeline from trait objects with a discarding run log (tests).
    pub fn with_deps(
        collectors: Vec<Box<dyn Collector>>,
        prefilter: Prefilter,
        enhancer: Option<Box<dyn Enhance>>,
        scorer: Box<dyn CandidateScorer>,
        storage: Box<dyn CandidateStore>,
        notifier: Box<dyn NotificationSink>,
    ) -> Self {
        Self::new(
            collectors,
            prefilter,
            enhancer,
            scorer,
            storage,
            notifier,
            RunLog::sink(),
        )
    }

    /// Run all eight stages, returning the aggregated counters.
    pub async fn run(&mut self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        self.run_log.log(EventKind::RunStarted);

        // Stage 1: collect, sequential across collectors.
        let mut candidates: Vec<RawCandidate> = Vec::new();
        for collector in &self.collectors {
            if !collector.enabled() {
                info!(source = collector.name(), "collector disabled, skipping");
                continue;
            }
            match collector.collect().await {
                Ok(batch) => {
                    info!(source = collector.name(), count = batch.len(), "collected");
                    self.run_log.log(EventKind::CollectorFinished {
                        source: collector.name().to_string(),
                        count: batch.len(),
                    });
                    *stats
                        .collected_by_source
                        .entry(collector.name().to_string())
                        .or_insert(0) += batch.len();
                    candidates.extend(batch);
                }
                Err(e) => {
                    error!(source = collector.name(), error = %e, "collector failed, treated as empty");
                    stats.collector_errors += 1;
                    self.run_log.log(EventKind::CollectorFailed {
                        source: collector.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        stats.collected_total = candidates.len();
        if candidates.is_empty() {
            warn!("nothing collected, run ends after fallback maintenance");
            self.maintain_storage(&mut stats).await;
            self.finish(&mut stats);
            return Ok(stats);
        }

        // Stage 1.5: dedup — first within the run (keep earliest), then
        // against canonical URLs already in the primary store.
        let before = candidates.len();
        let mut seen: HashSet<String> = HashSet::new();
        candidates.retain(|c| {
            let key = canonicalize_url(&c.url);
            key.is_empty() || seen.insert(key)
        });
        stats.deduped_in_run = before - candidates.len();

        let existing = self.storage.existing_url_keys().await;
        let before = candidates.len();
        candidates.retain(|c| !existing.contains(&canonicalize_url(&c.url)));
        stats.deduped_existing = before - candidates.len();

        self.run_log.log(EventKind::DedupApplied {
            in_run: stats.deduped_in_run,
            already_stored: stats.deduped_existing,
            remaining: candidates.len(),
        });
        info!(
            in_run = stats.deduped_in_run,
            already_stored = stats.deduped_existing,
            remaining = candidates.len(),
            "dedup complete"
        );

        // Stage 2: prefilter.
        stats.prefilter_input = candidates.len();
        let outcome = self.prefilter.filter_batch(candidates);
        stats.prefilter_output = outcome.kept.len();
        self.run_log.log(EventKind::StageSummary {
            stage: "prefilter".into(),
            input: stats.prefilter_input,
            output: stats.prefilter_output,
            errors: 0,
        });
        for (source, (input, output)) in &outcome.per_source {
            info!(source = %source, input = *input, output = *output, "prefilter per-source");
        }
        let mut candidates = outcome.kept;
        if candidates.is_empty() {
            warn!("nothing survived prefilter, run ends after fallback maintenance");
            self.maintain_storage(&mut stats).await;
            self.finish(&mut stats);
            return Ok(stats);
        }

        // Stage 3: PDF enhancement for the arXiv subset.
        if let Some(ref enhancer) = self.enhancer {
            let input = candidates.len();
            candidates = enhancer.enhance_batch(candidates).await;
            stats.enhanced = candidates
                .iter()
                .filter(|c| c.raw_metadata.contains_key("evaluation_summary"))
                .count();
            self.run_log.log(EventKind::StageSummary {
                stage: "enhance".into(),
                input,
                output: candidates.len(),
                errors: 0,
            });
        }

        // Stage 4: scoring.
        let score_input = candidates.len();
        let scored = self.scorer.score_batch(candidates).await;
        stats.scored = scored.len();
        stats.stage_errors += (score_input - scored.len()) as u32;
        self.run_log.log(EventKind::StageSummary {
            stage: "score".into(),
            input: score_input,
            output: scored.len(),
            errors: (score_input - scored.len()) as u32,
        });

        // Stage 5: drop low priority — never persisted, never notified.
        let before = scored.len();
        let to_save: Vec<ScoredCandidate> = scored
            .into_iter()
            .filter(|c| c.priority() != Priority::Low)
            .collect();
        stats.dropped_low = before - to_save.len();
        self.run_log.log(EventKind::PriorityFiltered {
            dropped_low: stats.dropped_low,
        });
        info!(dropped = stats.dropped_low, kept = to_save.len(), "priority filter");

        // Stage 5.5: hero-image upload for the survivors only, so dropped
        // candidates never spend an upload call.
        let mut to_save = to_save;
        if let Some(ref enhancer) = self.enhancer {
            let input = to_save.len();
            to_save = enhancer.upload_hero_images(to_save).await;
            let with_keys = to_save
                .iter()
                .filter(|c| c.raw.hero_image_key.is_some())
                .count();
            self.run_log.log(EventKind::StageSummary {
                stage: "hero_images".into(),
                input,
                output: with_keys,
                errors: 0,
            });
        }

        // Stage 6: persist (backfill first, then save, then purge).
        match self.storage.backfill().await {
            Ok(n) => stats.backfilled = n,
            Err(e) => {
                warn!(error = %e, "backfill failed");
                stats.stage_errors += 1;
            }
        }
        match self.storage.save(to_save.clone()).await {
            Ok(report) => {
                stats.saved_primary = report.primary_saved;
                stats.saved_fallback = report.fallback_saved;
                stats.skipped_existing = report.skipped_existing;
            }
            Err(e) => {
                error!(error = %e, "save failed entirely");
                stats.stage_errors += 1;
            }
        }
        if let Err(e) = self.storage.purge().await {
            warn!(error = %e, "fallback purge failed");
        }
        self.run_log.log(EventKind::SaveComplete {
            primary: stats.saved_primary,
            fallback: stats.saved_fallback,
            skipped_existing: stats.skipped_existing,
            backfilled: stats.backfilled,
        });

        // Stage 7: notify with the to-save set.
        match self.notifier.notify(&to_save).await {
            Ok(notify_stats) => {
                stats.notify_cards = notify_stats.cards_sent;
                stats.notify_suppressed = notify_stats.suppressed;
                self.run_log.log(EventKind::NotifyComplete {
                    cards: notify_stats.cards_sent,
                    suppressed: notify_stats.suppressed,
                    recorded: notify_stats.recorded,
                });
            }
            Err(e) => {
                warn!(error = %e, "notification stage failed");
                stats.stage_errors += 1;
            }
        }

        self.finish(&mut stats);
        Ok(stats)
    }

    /// Backfill and purge still run on early exits so rows stranded in the
    /// fallback store migrate as soon as the primary recovers.
    async fn maintain_storage(&mut self, stats: &mut RunStats) {
        match self.storage.backfill().await {
            Ok(n) => stats.backfilled = n,
            Err(e) => {
                warn!(error = %e, "backfill failed");
                stats.stage_errors += 1;
            }
        }
        if let Err(e) = self.storage.purge().await {
            warn!(error = %e, "fallback purge failed");
        }
    }

    fn finish(&mut self, stats: &mut RunStats) {
        self.run_log.log(EventKind::RunFinished {
            summary: format!(
                "collected={} scored={} saved={}+{} cards={}",
                stats.collected_total,
                stats.scored,
                stats.saved_primary,
                stats.saved_fallback,
                stats.notify_cards
            ),
        });
        info!("{stats}");
    }
}
