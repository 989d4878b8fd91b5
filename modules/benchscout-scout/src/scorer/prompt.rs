//! Scoring prompt and the structured response schema.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use ai_client::util::truncate_to_char_boundary;
use benchscout_common::constants::{
    BACKEND_REASONING_MIN_CHARS, OVERALL_REASONING_MIN_CHARS, REASONING_MIN_CHARS, TASK_DOMAINS,
    TOOL_REASONING_MIN_CHARS,
};
use benchscout_common::RawCandidate;

/// What the model returns for each candidate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScoreResponse {
    /// Activity score 0-10: community traction and maintenance.
    pub activity_score: f64,
    /// Detailed activity reasoning, at least 150 characters, citing concrete numbers.
    pub activity_reasoning: String,
    /// Reproducibility score 0-10: open code/data/eval scripts.
    pub reproducibility_score: f64,
    /// Detailed reproducibility reasoning, at least 150 characters.
    pub reproducibility_reasoning: String,
    /// License score 0-10: MIT/Apache/BSD high, unknown or proprietary low.
    pub license_score: f64,
    /// Detailed license reasoning, at least 150 characters.
    pub license_reasoning: String,
    /// Novelty score 0-10: new task, new protocol, or new measurement axis.
    pub novelty_score: f64,
    /// Detailed novelty reasoning, at least 150 characters.
    pub novelty_reasoning: String,
    /// Relevance score 0-10: fit to agent/coding/backend evaluation needs.
    pub relevance_score: f64,
    /// Detailed relevance reasoning, at least 150 characters.
    pub relevance_reasoning: String,

    /// True when the candidate is NOT a real benchmark (tool, framework,
    /// algorithm paper, model release).
    pub is_not_benchmark: bool,
    /// One of: algorithm_paper, system_framework, tool_sdk, model_release.
    /// Null when the candidate is a real benchmark.
    pub non_benchmark_category: Option<String>,
    /// Justification for the benchmark/non-benchmark call, at least 100 characters.
    pub tool_reasoning: String,

    /// Backend-specialty fit 0-10. Only set for backend benchmarks
    /// (web frameworks, databases, API performance); null otherwise.
    pub backend_fit_score: Option<f64>,
    /// Backend fit reasoning, at least 200 characters when the score is set.
    pub backend_fit_reasoning: Option<String>,
    /// Backend engineering-practice value 0-10; null unless a backend benchmark.
    pub backend_engineering_score: Option<f64>,
    /// Backend engineering reasoning, at least 200 characters when the score is set.
    pub backend_engineering_reasoning: Option<String>,

    /// Task domain from the fixed vocabulary.
    pub task_domain: String,
    /// Evaluation metric names found in the material, up to 5.
    pub metrics: Vec<String>,
    /// Baseline systems reported, up to 5.
    pub baselines: Vec<String>,
    /// Leading institution, if identifiable.
    pub institution: Option<String>,
    /// Dataset size as an integer item count, if stated.
    pub dataset_size: Option<i64>,

    /// One-paragraph overall assessment, at least 50 characters.
    pub overall_reasoning: String,
}

/// A reasoning field that failed its minimum length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthIssue {
    pub field: &'static str,
    pub required: usize,
    pub actual: usize,
}

impl ScoreResponse {
    /// Clamp scores into [0,10] and collapse NaNs; always possible, so range
    /// problems never enter the repair loop.
    pub fn normalize(&mut self) {
        for score in [
            &mut self.activity_score,
            &mut self.reproducibility_score,
            &mut self.license_score,
            &mut self.novelty_score,
            &mut self.relevance_score,
        ] {
            if !score.is_finite() {
                *score = 0.0;
            }
            *score = score.clamp(0.0, 10.0);
        }
        for score in [
            &mut self.backend_fit_score,
            &mut self.backend_engineering_score,
        ] {
            if let Some(v) = score {
                if !v.is_finite() {
                    *score = None;
                } else {
                    *v = v.clamp(0.0, 10.0);
                }
            }
        }
        if !TASK_DOMAINS.contains(&self.task_domain.as_str()) {
            self.task_domain = benchscout_common::constants::DEFAULT_TASK_DOMAIN.to_string();
        }
        self.metrics.truncate(5);
        self.baselines.truncate(5);
    }

    /// Reasoning-length validation. An empty result means the response is
    /// acceptable; a non-empty one is repairable by re-prompting.
    pub fn length_issues(&self) -> Vec<LengthIssue> {
        let mut issues = Vec::new();
        let mut check = |field: &'static str, text: &str, required: usize| {
            let actual = text.chars().count();
            if actual < required {
                issues.push(LengthIssue {
                    field,
                    required,
                    actual,
                });
            }
        };

        check("activity_reasoning", &self.activity_reasoning, REASONING_MIN_CHARS);
        check(
            "reproducibility_reasoning",
            &self.reproducibility_reasoning,
            REASONING_MIN_CHARS,
        );
        check("license_reasoning", &self.license_reasoning, REASONING_MIN_CHARS);
        check("novelty_reasoning", &self.novelty_reasoning, REASONING_MIN_CHARS);
        check("relevance_reasoning", &self.relevance_reasoning, REASONING_MIN_CHARS);
        check(
            "overall_reasoning",
            &self.overall_reasoning,
            OVERALL_REASONING_MIN_CHARS,
        );

        if self.is_not_benchmark {
            check("tool_reasoning", &self.tool_reasoning, TOOL_REASONING_MIN_CHARS);
        }
        if self.backend_fit_score.is_some() {
            check(
                "backend_fit_reasoning",
                self.backend_fit_reasoning.as_deref().unwrap_or(""),
                BACKEND_REASONING_MIN_CHARS,
            );
        }
        if self.backend_engineering_score.is_some() {
            check(
                "backend_engineering_reasoning",
                self.backend_engineering_reasoning.as_deref().unwrap_or(""),
                BACKEND_REASONING_MIN_CHARS,
            );
        }

        issues
    }
}

/// The system prompt: the benchmark taxonomy, the scoring rubric, and the
/// output contract. Deliberately long and example-heavy; classification
/// quality tracks directly with how sharply the negative classes are drawn.
pub fn system_prompt() -> String {
    format!(
        r#"You are a benchmark intelligence reviewer. Your job is to decide whether a
discovered artifact is a REAL evaluation benchmark for AI/agent systems, and to
score it on five dimensions with detailed, evidence-grounded reasoning.

## What counts as a real benchmark (ALL four required)
1. A defined evaluation task (code generation, web navigation, tool calling,
   request throughput, query latency, ...).
2. A standardized test set or workload - not demo data.
3. Explicit metrics (Pass@k, accuracy, success rate, requests/second, ...).
4. Reported baseline results, or infrastructure clearly built to produce them.

## What is NOT a benchmark (classify and set is_not_benchmark=true)
- algorithm_paper: a new method/algorithm evaluated ON existing benchmarks.
  The contribution is the method, not the evaluation artifact.
  Example: "A new MCTS planning method for code generation, evaluated on
  HumanEval" -> algorithm_paper.
- system_framework: an agent framework, orchestration system, or runtime.
  Example: an agent workflow engine with demo tasks -> system_framework.
- tool_sdk: client libraries, SDK wrappers, protocol implementations, dev
  tools. Example: an API client for a model provider -> tool_sdk.
- model_release: a model/checkpoint announcement or technical report whose
  evaluation section reuses existing benchmarks -> model_release.

## Kept despite looking meta
Benchmark METHODOLOGY papers - work whose contribution is how to construct or
validate benchmarks (new contamination controls, new task-generation
pipelines) - ARE benchmarks for our purposes. is_not_benchmark=false.
Example: "A method for constructing semantic evaluation suites" -> keep.

## Classification walkthrough (do this FIRST, before scoring)
Ask, in order:
1. Does the artifact define an evaluation task of its own? If the task
   definition lives in some OTHER benchmark and this work merely runs on it,
   you are looking at an algorithm paper or model release.
2. Is there a fixed, versioned set of test items or workloads? A handful of
   demo scripts is not a test set. A scraping pipeline that RE-GENERATES a
   versioned set still counts (methodology).
3. Are metrics named and computable by a third party? "We observed better
   results" without a metric definition fails this test.
4. Are baseline numbers reported, or is the harness obviously built to
   produce them (a leaderboard site, a results table in the README)?
If any answer is no, classify as non-benchmark and pick the closest
category. State the failing criteria in tool_reasoning.

## Worked classification examples
- "SWE-bench: 2,294 GitHub issues with test-based resolution checking,
  reported resolution rates for GPT-4 and Claude" -> real benchmark
  (task + set + metric + baselines all present).
- "A repository search agent built on tree search, evaluated on SWE-bench"
  -> algorithm_paper (the evaluation artifact belongs to someone else).
- "An orchestration framework for multi-agent pipelines, with three demo
  workflows" -> system_framework (no standardized set, no metrics).
- "A typed client for a model provider's REST API" -> tool_sdk.
- "Foo-70B technical report, with MMLU/HumanEval/GSM8K numbers" ->
  model_release (reuses existing benchmarks; the artifact is the model).
- "A contamination-resistant protocol for building coding test sets, applied
  to produce a 1,000-problem suite" -> real benchmark (methodology class).
- "Continuously-run web framework throughput rounds across JSON, single
  query, multi query, fortune, update, and plaintext workloads" -> real
  benchmark, backend specialty.
- "awesome-llm-agents: a curated list of agent papers and repos" -> not a
  benchmark; tool_sdk is the closest category for link collections.

## Scoring dimensions (0-10 each, one decimal allowed)
1. activity_score: stars, recency of commits/updates, community signals.
   Cite concrete numbers ("1,500 stars, pushed 6 days ago").
   9-10: very active, maintained this month, visible adoption.
   6-8: maintained this quarter, moderate adoption.
   3-5: stale for months or tiny audience.
   0-2: abandoned or unverifiable.
2. reproducibility_score: code + data + harness availability, documentation
   quality, setup cost.
   9-10: one-command evaluation, public data, pinned dependencies.
   6-8: code and data public but assembly required.
   3-5: partial release (data only, or code without the harness).
   0-2: closed or unreleased material.
3. license_score: MIT/Apache/BSD ~10, permissive-with-caveats 6-8,
   research-only ~5, unknown <=4, proprietary <=2.
4. novelty_score: new task domain or measurement protocol 8-10; meaningful
   extension of an existing suite 5-7; an incremental variant or a
   re-packaging 2-4.
5. relevance_score: value for evaluating coding agents, web/GUI agents,
   tool use, multi-agent systems, or backend/system performance.
   Direct agent/coding evaluation 8-10 (SWE-bench, WebArena class).
   Tool use / planning 6-8. General LLM capability suites 3-5.
   Unrelated domains (pure vision, speech) 0-2.
   Non-benchmarks (tools/frameworks/lists) score <=2 here regardless of
   popularity: a 50k-star framework is still relevance <=2.

## Backend specialty
Only when the artifact is a backend performance benchmark (web framework
throughput, database workloads, API latency suites): also set
backend_fit_score and backend_engineering_score with their own reasoning of
at least {backend_min} characters each. Otherwise leave all four backend
fields null.

## Reasoning requirements
Each of the five *_reasoning fields needs at least {reasoning_min} characters
of specific, factual analysis - name the metrics, the dataset sizes, the
baselines, the license. tool_reasoning needs at least {tool_min} characters
and must state the classification decision explicitly. overall_reasoning is a
summary of at least {overall_min} characters. Never pad with filler; add
evidence instead.

## Extraction
task_domain must be one of: {domains}. metrics and baselines list what the
material actually reports (max 5 each). dataset_size is the item count as an
integer when stated, else null."#,
        backend_min = BACKEND_REASONING_MIN_CHARS,
        reasoning_min = REASONING_MIN_CHARS,
        tool_min = TOOL_REASONING_MIN_CHARS,
        overall_min = OVERALL_REASONING_MIN_CHARS,
        domains = TASK_DOMAINS.join(", "),
    )
}

/// Per-candidate user prompt: every field the collectors and enhancer gathered.
pub fn build_user_prompt(candidate: &RawCandidate) -> String {
    let mut prompt = format!(
        "Score this candidate.\n\nTitle: {}\nSource: {}\nURL: {}\n",
        candidate.title, candidate.source, candidate.url
    );

    if let Some(ref abstract_text) = candidate.abstract_text {
        prompt.push_str(&format!(
            "Abstract:\n{}\n",
            truncate_to_char_boundary(abstract_text, 4000)
        ));
    }
    if let Some(stars) = candidate.github_stars {
        prompt.push_str(&format!("GitHub stars: {stars}\n"));
    }
    if let Some(ref url) = candidate.github_url {
        prompt.push_str(&format!("GitHub URL: {url}\n"));
    }
    if let Some(ref url) = candidate.dataset_url {
        prompt.push_str(&format!("Dataset URL: {url}\n"));
    }
    if let Some(ref license) = candidate.license_type {
        prompt.push_str(&format!("License: {license}\n"));
    }
    if let Some(ref task) = candidate.task_type {
        prompt.push_str(&format!("Task type: {task}\n"));
    }
    if let Some(date) = candidate.publish_date {
        prompt.push_str(&format!("Published: {}\n", date.format("%Y-%m-%d")));
    }
    if !candidate.evaluation_metrics.is_empty() {
        prompt.push_str(&format!(
            "Observed metrics: {}\n",
            candidate.evaluation_metrics.join(", ")
        ));
    }
    if !candidate.raw_baselines.is_empty() {
        prompt.push_str(&format!(
            "Observed baselines: {}\n",
            candidate.raw_baselines.join(", ")
        ));
    }
    if let Some(ref institutions) = candidate.raw_institutions {
        prompt.push_str(&format!("Institutions: {institutions}\n"));
    }
    if let Some(ref size) = candidate.raw_dataset_size {
        prompt.push_str(&format!("Stated dataset size: {size}\n"));
    }

    for key in ["evaluation_summary", "dataset_summary", "baselines_summary"] {
        if let Some(text) = candidate.raw_metadata.get(key) {
            if !text.is_empty() {
                prompt.push_str(&format!(
                    "{key}:\n{}\n",
                    truncate_to_char_boundary(text, 1200)
                ));
            }
        }
    }

    prompt
}

/// The user turn sent on a repair round, naming the under-length fields.
pub fn build_repair_prompt(issues: &[LengthIssue]) -> String {
    let mut lines = vec![
        "Your previous answer is kept above. The scores are fine, but these \
         reasoning fields are below their minimum length. Return the complete \
         structured response again with ONLY those fields expanded - add \
         concrete evidence, do not change any score:"
            .to_string(),
    ];
    for issue in issues {
        lines.push(format!(
            "- {}: {} characters, needs at least {}",
            issue.field, issue.actual, issue.required
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use benchscout_common::Source;

    pub(crate) fn valid_response() -> ScoreResponse {
        let long = "Concrete, detailed reasoning grounded in the observed repository \
                    state: stars, commit cadence, documentation, datasets, license \
                    terms, and comparisons against prior suites in the same domain."
            .to_string();
        assert!(long.chars().count() >= 150);
        ScoreResponse {
            activity_score: 8.0,
            activity_reasoning: long.clone(),
            reproducibility_score: 8.0,
            reproducibility_reasoning: long.clone(),
            license_score: 8.0,
            license_reasoning: long.clone(),
            novelty_score: 8.0,
            novelty_reasoning: long.clone(),
            relevance_score: 8.0,
            relevance_reasoning: long.clone(),
            is_not_benchmark: false,
            non_benchmark_category: None,
            tool_reasoning: "This is a real benchmark: defined task, standardized test set, \
                             explicit metrics, and published baseline results."
                .to_string(),
            backend_fit_score: None,
            backend_fit_reasoning: None,
            backend_engineering_score: None,
            backend_engineering_reasoning: None,
            task_domain: "Coding".to_string(),
            metrics: vec!["Pass@k".into()],
            baselines: vec!["GPT-4".into()],
            institution: None,
            dataset_size: Some(500),
            overall_reasoning: "A well-built coding benchmark with open data and harness."
                .to_string(),
        }
    }

    #[test]
    fn valid_response_has_no_issues() {
        assert!(valid_response().length_issues().is_empty());
    }

    #[test]
    fn short_reasoning_flagged() {
        let mut resp = valid_response();
        resp.novelty_reasoning = "too short".into();
        let issues = resp.length_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "novelty_reasoning");
        assert_eq!(issues[0].required, 150);
    }

    #[test]
    fn tool_reasoning_checked_only_for_non_benchmarks() {
        let mut resp = valid_response();
        resp.tool_reasoning = "short".into();
        assert!(resp.length_issues().is_empty());

        resp.is_not_benchmark = true;
        let issues = resp.length_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "tool_reasoning");
        assert_eq!(issues[0].required, 100);
    }

    #[test]
    fn backend_reasoning_needs_two_hundred_chars() {
        let mut resp = valid_response();
        resp.backend_fit_score = Some(7.0);
        resp.backend_fit_reasoning = Some("x".repeat(199));
        let issues = resp.length_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "backend_fit_reasoning");

        resp.backend_fit_reasoning = Some("x".repeat(200));
        assert!(resp.length_issues().is_empty());
    }

    #[test]
    fn normalize_clamps_scores_and_domain() {
        let mut resp = valid_response();
        resp.activity_score = 14.0;
        resp.license_score = -3.0;
        resp.novelty_score = f64::NAN;
        resp.task_domain = "SomethingElse".into();
        resp.normalize();
        assert_eq!(resp.activity_score, 10.0);
        assert_eq!(resp.license_score, 0.0);
        assert_eq!(resp.novelty_score, 0.0);
        assert_eq!(resp.task_domain, "Other");
    }

    #[test]
    fn user_prompt_includes_enrichment() {
        let mut c = RawCandidate::new(
            "AgentArena benchmark",
            "https://arxiv.org/abs/2401.11111",
            Source::Arxiv,
        );
        c.abstract_text = Some("We present a benchmark.".into());
        c.raw_metadata
            .insert("evaluation_summary".into(), "Evaluated on 500 tasks".into());
        let prompt = build_user_prompt(&c);
        assert!(prompt.contains("AgentArena benchmark"));
        assert!(prompt.contains("evaluation_summary"));
        assert!(prompt.contains("500 tasks"));
    }

    #[test]
    fn repair_prompt_names_fields() {
        let issues = vec![LengthIssue {
            field: "activity_reasoning",
            required: 150,
            actual: 40,
        }];
        let prompt = build_repair_prompt(&issues);
        assert!(prompt.contains("activity_reasoning"));
        assert!(prompt.contains("150"));
        assert!(prompt.contains("do not change any score"));
    }

    #[test]
    fn system_prompt_carries_taxonomy() {
        let prompt = system_prompt();
        assert!(prompt.contains("algorithm_paper"));
        assert!(prompt.contains("system_framework"));
        assert!(prompt.contains("tool_sdk"));
        assert!(prompt.contains("model_release"));
        assert!(prompt.contains("METHODOLOGY"));
    }
}
