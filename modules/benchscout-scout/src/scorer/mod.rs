//! Bounded-concurrency LLM scoring: cache lookup, structured call, length
//! validation with a two-round repair loop, rule fallback when the endpoint
//! stays down.

pub mod prompt;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use ai_client::{Claude, Exchange};
use benchscout_common::constants::{
    LLM_MAX_RETRIES, LLM_MAX_TOKENS, LLM_TIMEOUT_SECS, REPAIR_MAX_ATTEMPTS, SCORE_CACHE_TTL_SECS,
};
use benchscout_common::{
    canonicalize_url, NonBenchmarkCategory, RawCandidate, ScoreSet, ScoreWeights, ScoredCandidate,
};
use benchscout_store::cache::fingerprint;
use benchscout_store::CacheClient;

use prompt::{build_repair_prompt, build_user_prompt, system_prompt, ScoreResponse};

/// Seam for the orchestrator; tests drive the pipeline with a scripted scorer.
#[async_trait]
pub trait CandidateScorer: Send + Sync {
    async fn score_batch(&self, candidates: Vec<RawCandidate>) -> Vec<ScoredCandidate>;
}

pub struct LlmScorer {
    claude: Claude,
    cache: CacheClient,
    weights: ScoreWeights,
    semaphore: Arc<Semaphore>,
    system_prompt: String,
    /// Counters observable in tests and the run log.
    pub metrics: ScorerMetrics,
}

#[derive(Debug, Default)]
pub struct ScorerMetrics {
    pub cache_hits: std::sync::atomic::AtomicU32,
    pub llm_calls: std::sync::atomic::AtomicU32,
    pub repairs: std::sync::atomic::AtomicU32,
    pub fallbacks: std::sync::atomic::AtomicU32,
    pub dropped: std::sync::atomic::AtomicU32,
}

impl LlmScorer {
    pub fn new(
        api_key: &str,
        model: &str,
        cache: CacheClient,
        weights: ScoreWeights,
        concurrency: usize,
    ) -> Self {
        let claude =
            Claude::new(api_key, model).with_timeout(Duration::from_secs(LLM_TIMEOUT_SECS));
        Self {
            claude,
            cache,
            weights,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            system_prompt: system_prompt(),
            metrics: ScorerMetrics::default(),
        }
    }

    fn cache_key(candidate: &RawCandidate) -> String {
        let canonical = canonicalize_url(&candidate.url);
        format!("score:{}", fingerprint(&[&candidate.title, &canonical]))
    }

    async fn score_one(&self, candidate: RawCandidate) -> Option<ScoredCandidate> {
        use std::sync::atomic::Ordering;

        let key = Self::cache_key(&candidate);
        if let Some(mut cached) = self.cache.get::<ScoreResponse>(&key).await {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            cached.normalize();
            debug!(title = %candidate.title, "score cache hit");
            return Some(self.assemble(candidate, cached));
        }

        match self.call_with_repair(&candidate).await {
            Ok(response) => {
                self.cache.set(&key, &response, SCORE_CACHE_TTL_SECS).await;
                Some(self.assemble(candidate, response))
            }
            Err(ScoreError::Unreachable(e)) => {
                self.metrics.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(title = %candidate.title, error = %e, "model unreachable, fallback=true rule scoring");
                let scores = rules::rule_score(&candidate);
                Some(ScoredCandidate::from_parts(candidate, scores, &self.weights))
            }
            Err(ScoreError::Validation(e)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(title = %candidate.title, error = %e, "score validation exhausted repairs, candidate dropped");
                None
            }
        }
    }

    /// The repair state machine: call -> validate -> (done | repair_1 ->
    /// validate -> (done | repair_2 -> validate -> (done | fail))).
    async fn call_with_repair(&self, candidate: &RawCandidate) -> Result<ScoreResponse, ScoreError> {
        use std::sync::atomic::Ordering;

        let user_prompt = build_user_prompt(candidate);
        let mut history: Vec<Exchange> = Vec::new();

        for round in 0..=REPAIR_MAX_ATTEMPTS {
            let mut response = self
                .invoke(&user_prompt, &history)
                .await
                .map_err(ScoreError::Unreachable)?;
            response.normalize();

            let issues = response.length_issues();
            if issues.is_empty() {
                return Ok(response);
            }
            if round == REPAIR_MAX_ATTEMPTS {
                let fields: Vec<&str> = issues.iter().map(|i| i.field).collect();
                return Err(ScoreError::Validation(anyhow!(
                    "reasoning below minimum after {REPAIR_MAX_ATTEMPTS} repairs: {}",
                    fields.join(", ")
                )));
            }

            self.metrics.repairs.fetch_add(1, Ordering::Relaxed);
            debug!(
                title = %candidate.title,
                round = round + 1,
                short_fields = issues.len(),
                "entering repair round"
            );
            history.push(Exchange {
                assistant_json: serde_json::to_string(&response).unwrap_or_default(),
                follow_up: build_repair_prompt(&issues),
            });
        }
        unreachable!("repair loop bounds are inclusive");
    }

    /// One structured call with transport-level retries.
    async fn invoke(&self, user_prompt: &str, history: &[Exchange]) -> Result<ScoreResponse> {
        use std::sync::atomic::Ordering;

        let mut last_error = None;
        for attempt in 1..=LLM_MAX_RETRIES {
            self.metrics.llm_calls.fetch_add(1, Ordering::Relaxed);
            let result = if history.is_empty() {
                self.claude
                    .extract::<ScoreResponse>(&self.system_prompt, user_prompt, LLM_MAX_TOKENS)
                    .await
            } else {
                self.claude
                    .extract_with_history::<ScoreResponse>(
                        &self.system_prompt,
                        user_prompt,
                        history,
                        LLM_MAX_TOKENS,
                    )
                    .await
            };
            match result {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(attempt, max = LLM_MAX_RETRIES, error = %e, "model call failed");
                    last_error = Some(e);
                    if attempt < LLM_MAX_RETRIES {
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("model call failed")))
    }

    fn assemble(&self, candidate: RawCandidate, response: ScoreResponse) -> ScoredCandidate {
        let scores = score_set_from_response(response);
        ScoredCandidate::from_parts(candidate, scores, &self.weights)
    }
}

enum ScoreError {
    Unreachable(anyhow::Error),
    Validation(anyhow::Error),
}

fn score_set_from_response(r: ScoreResponse) -> ScoreSet {
    ScoreSet {
        activity: r.activity_score,
        activity_reasoning: r.activity_reasoning,
        reproducibility: r.reproducibility_score,
        reproducibility_reasoning: r.reproducibility_reasoning,
        license: r.license_score,
        license_reasoning: r.license_reasoning,
        novelty: r.novelty_score,
        novelty_reasoning: r.novelty_reasoning,
        relevance: r.relevance_score,
        relevance_reasoning: r.relevance_reasoning,
        backend_fit: r.backend_fit_score,
        backend_fit_reasoning: r.backend_fit_reasoning,
        backend_engineering: r.backend_engineering_score,
        backend_engineering_reasoning: r.backend_engineering_reasoning,
        is_not_benchmark: r.is_not_benchmark,
        non_benchmark_category: r
            .non_benchmark_category
            .as_deref()
            .map(NonBenchmarkCategory::from_str_loose)
            .unwrap_or_default(),
        tool_reasoning: r.tool_reasoning,
        task_domain: r.task_domain,
        metrics: r.metrics,
        baselines: r.baselines,
        institution: r.institution,
        dataset_size: r.dataset_size,
        overall_reasoning: r.overall_reasoning,
        fallback: false,
    }
}

#[async_trait]
impl CandidateScorer for LlmScorer {
    /// Fan out over the batch behind the semaphore. Order of results follows
    /// completion, not input; failed candidates are dropped, never fatal.
    async fn score_batch(&self, candidates: Vec<RawCandidate>) -> Vec<ScoredCandidate> {
        let total = candidates.len();
        if total == 0 {
            return Vec::new();
        }

        let concurrency = self.semaphore.available_permits().max(1);
        let scored: Vec<Option<ScoredCandidate>> =
            stream::iter(candidates.into_iter().map(|candidate| {
                let semaphore = Arc::clone(&self.semaphore);
                async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    self.score_one(candidate).await
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let results: Vec<ScoredCandidate> = scored.into_iter().flatten().collect();
        info!(
            input = total,
            output = results.len(),
            "scoring batch complete"
        );
        results
    }
}
