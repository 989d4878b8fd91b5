//! Rule-based prefilter: pure ordered checks over a single candidate,
//! short-circuiting on the first failure. Each rejection carries a reason
//! tag for the run log.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use benchscout_common::constants::{
    GITHUB_CURATED_PATTERNS, GITHUB_MAX_DAYS_SINCE_PUSH, GITHUB_MIN_README_LENGTH,
    GITHUB_README_FEATURE_KEYWORDS, GITHUB_TOOL_SUFFIXES, PREFILTER_EXCLUDED_KEYWORDS,
    PREFILTER_MIN_ABSTRACT_LENGTH, PREFILTER_MIN_TITLE_LENGTH, PREFILTER_REQUIRED_KEYWORDS,
    STRONG_BENCHMARK_SIGNALS,
};
use benchscout_common::{RawCandidate, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterReason {
    Pass,
    TitleShort,
    AbstractShort,
    InvalidUrl,
    SourceDisabled,
    KeywordRule,
    GithubQuality,
    CuratedList,
    ToolRepo,
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            FilterReason::Pass => "pass",
            FilterReason::TitleShort => "title_short",
            FilterReason::AbstractShort => "abstract_short",
            FilterReason::InvalidUrl => "invalid_url",
            FilterReason::SourceDisabled => "source_disabled",
            FilterReason::KeywordRule => "keyword_rule",
            FilterReason::GithubQuality => "github_quality",
            FilterReason::CuratedList => "curated_list",
            FilterReason::ToolRepo => "tool_repo",
        };
        write!(f, "{tag}")
    }
}

/// Dynamic GitHub star floor by repository age.
pub fn dynamic_star_threshold(age_days: i64) -> u64 {
    if age_days <= 7 {
        5
    } else if age_days <= 30 {
        15
    } else if age_days <= 90 {
        30
    } else {
        50
    }
}

#[derive(Debug, Default, Clone)]
pub struct PrefilterOutcome {
    pub kept: Vec<RawCandidate>,
    pub reasons: BTreeMap<String, u32>,
    /// Per-source (input, output) counts.
    pub per_source: BTreeMap<String, (u32, u32)>,
}

pub struct Prefilter {
    enabled_sources: HashSet<Source>,
    now: fn() -> chrono::DateTime<chrono::Utc>,
}

impl Prefilter {
    pub fn new(enabled_sources: HashSet<Source>) -> Self {
        Self {
            enabled_sources,
            now: chrono::Utc::now,
        }
    }

    /// Apply the rule chain to a batch, tallying rejection reasons and
    /// per-source pass rates for the stage summary.
    pub fn filter_batch(&self, candidates: Vec<RawCandidate>) -> PrefilterOutcome {
        let mut outcome = PrefilterOutcome::default();
        for candidate in candidates {
            let source_key = candidate.source.to_string();
            let entry = outcome.per_source.entry(source_key).or_insert((0, 0));
            entry.0 += 1;

            let reason = self.check(&candidate);
            *outcome.reasons.entry(reason.to_string()).or_insert(0) += 1;
            if reason == FilterReason::Pass {
                entry.1 += 1;
                outcome.kept.push(candidate);
            } else {
                debug!(
                    title = %candidate.title.chars().take(50).collect::<String>(),
                    source = %candidate.source,
                    reason = %reason,
                    "candidate filtered"
                );
            }
        }
        outcome
    }

    /// Ordered checks; first failure wins.
    pub fn check(&self, c: &RawCandidate) -> FilterReason {
        // 1. Structural length floors.
        if c.title.trim().chars().count() < PREFILTER_MIN_TITLE_LENGTH {
            return FilterReason::TitleShort;
        }
        if !c.source.short_abstract_allowed() {
            let abstract_len = c
                .abstract_text
                .as_deref()
                .map(|a| a.trim().chars().count())
                .unwrap_or(0);
            if abstract_len < PREFILTER_MIN_ABSTRACT_LENGTH {
                return FilterReason::AbstractShort;
            }
        }

        // 2. URL shape.
        if !c.url.starts_with("http://") && !c.url.starts_with("https://") {
            return FilterReason::InvalidUrl;
        }

        // 3. Source allow-list.
        if !self.enabled_sources.contains(&c.source) {
            return FilterReason::SourceDisabled;
        }

        // 4. Trusted sources are curated upstream; the keyword and
        // benchmark-feature rules below do not apply to them.
        if c.source.is_trusted() {
            return FilterReason::Pass;
        }

        // 5. Keyword allow/deny over title + abstract.
        let haystack = c.keyword_haystack();
        if PREFILTER_EXCLUDED_KEYWORDS
            .iter()
            .any(|kw| haystack.contains(kw))
        {
            return FilterReason::KeywordRule;
        }
        if !PREFILTER_REQUIRED_KEYWORDS
            .iter()
            .any(|kw| haystack.contains(kw))
        {
            return FilterReason::KeywordRule;
        }

        // 6. GitHub quality gate.
        if c.source == Source::Github {
            if !self.passes_github_gate(c) {
                return FilterReason::GithubQuality;
            }
            if looks_like_curated_list(c) {
                return FilterReason::CuratedList;
            }
            if looks_like_tool_repo(c) {
                return FilterReason::ToolRepo;
            }
        }

        FilterReason::Pass
    }

    fn passes_github_gate(&self, c: &RawCandidate) -> bool {
        let now = (self.now)();

        let age_days = c
            .raw_metadata
            .get("created_at")
            .and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok())
            .map(|created| (now - created.with_timezone(&chrono::Utc)).num_days())
            .unwrap_or(i64::MAX);
        let stars = c.github_stars.unwrap_or(0);
        if stars < dynamic_star_threshold(age_days) {
            return false;
        }

        let pushed = match c.publish_date {
            Some(date) => date,
            None => return false,
        };
        if (now - pushed).num_days() > GITHUB_MAX_DAYS_SINCE_PUSH {
            return false;
        }

        let readme = c.abstract_text.as_deref().unwrap_or("");
        if readme.chars().count() < GITHUB_MIN_README_LENGTH {
            return false;
        }
        let readme_lower = readme.to_lowercase();
        GITHUB_README_FEATURE_KEYWORDS
            .iter()
            .any(|kw| readme_lower.contains(kw))
    }
}

fn looks_like_curated_list(c: &RawCandidate) -> bool {
    let title_lower = c.title.to_lowercase();
    if title_lower.contains("awesome-") || title_lower.contains("awesome ") {
        return true;
    }
    let readme_lower = c.abstract_text.as_deref().unwrap_or("").to_lowercase();
    GITHUB_CURATED_PATTERNS
        .iter()
        .any(|p| readme_lower.contains(p))
}

/// Tool/SDK repositories masquerade as benchmarks in search results. A strong
/// benchmark signal overrides the suffix heuristic so "tokenizer-benchmark"
/// style repos survive.
fn looks_like_tool_repo(c: &RawCandidate) -> bool {
    let haystack = c.keyword_haystack();
    if STRONG_BENCHMARK_SIGNALS.iter().any(|s| haystack.contains(s)) {
        return false;
    }

    let title_norm = c.title.to_lowercase().replace([' ', '_'], "-");
    GITHUB_TOOL_SUFFIXES
        .iter()
        .any(|suffix| title_norm.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn all_sources() -> HashSet<Source> {
        [
            Source::Arxiv,
            Source::Github,
            Source::Huggingface,
            Source::Helm,
            Source::Techempower,
            Source::Dbengines,
        ]
        .into_iter()
        .collect()
    }

    fn prefilter() -> Prefilter {
        Prefilter::new(all_sources())
    }

    fn arxiv_candidate() -> RawCandidate {
        let mut c = RawCandidate::new(
            "AgentArena: A Multi-Agent Benchmark",
            "https://arxiv.org/abs/2401.11111",
            Source::Arxiv,
        );
        c.abstract_text =
            Some("A benchmark for multi-agent code generation with a new test set.".into());
        c
    }

    fn github_candidate() -> RawCandidate {
        let mut c = RawCandidate::new(
            "org/agent-benchmark-suite",
            "https://github.com/org/agent-benchmark-suite",
            Source::Github,
        );
        c.github_stars = Some(120);
        c.publish_date = Some(Utc::now() - chrono::Duration::days(5));
        c.abstract_text = Some(format!(
            "A benchmark suite for agent evaluation with a leaderboard and baselines. {}",
            "filler ".repeat(80)
        ));
        c.raw_metadata.insert(
            "created_at".into(),
            (Utc::now() - chrono::Duration::days(200)).to_rfc3339(),
        );
        c
    }

    #[test]
    fn well_formed_arxiv_passes() {
        assert_eq!(prefilter().check(&arxiv_candidate()), FilterReason::Pass);
    }

    #[test]
    fn title_length_floor() {
        let mut c = arxiv_candidate();
        c.title = "Too short".into(); // 9 chars
        assert_eq!(prefilter().check(&c), FilterReason::TitleShort);
        c.title = "Ten chars!".into();
        assert_eq!(prefilter().check(&c), FilterReason::Pass);
    }

    #[test]
    fn abstract_boundary_exact_length_passes() {
        let mut c = arxiv_candidate();
        // The abstract must mention a required keyword; pad to exactly 20 chars.
        c.abstract_text = Some("benchmark code tests".into());
        assert_eq!(c.abstract_text.as_deref().unwrap().chars().count(), 20);
        assert_eq!(prefilter().check(&c), FilterReason::Pass);

        c.abstract_text = Some("benchmark code test".into()); // 19 chars
        assert_eq!(prefilter().check(&c), FilterReason::AbstractShort);
    }

    #[test]
    fn short_abstract_exempt_sources() {
        let mut c = RawCandidate::new(
            "org/tiny-benchmark-set",
            "https://huggingface.co/datasets/org/tiny",
            Source::Huggingface,
        );
        c.abstract_text = Some("code eval".into());
        assert_eq!(prefilter().check(&c), FilterReason::Pass);
    }

    #[test]
    fn invalid_url_rejected() {
        let mut c = arxiv_candidate();
        c.url = "ftp://arxiv.org/abs/2401.11111".into();
        assert_eq!(prefilter().check(&c), FilterReason::InvalidUrl);
    }

    #[test]
    fn disabled_source_rejected() {
        let enabled: HashSet<Source> = [Source::Arxiv].into_iter().collect();
        let prefilter = Prefilter::new(enabled);
        let mut c = arxiv_candidate();
        c.source = Source::Github;
        assert_eq!(prefilter.check(&c), FilterReason::SourceDisabled);
    }

    #[test]
    fn trusted_source_bypasses_keyword_rules() {
        // No required keyword anywhere, still passes via the trusted bypass.
        let mut c = RawCandidate::new(
            "FastAPI summary",
            "https://tfb-status.techempower.com/results/abc",
            Source::Techempower,
        );
        c.abstract_text = Some("FastAPI is a modern, fast web framework".into());
        assert_eq!(prefilter().check(&c), FilterReason::Pass);
    }

    #[test]
    fn excluded_keyword_rejects() {
        let mut c = arxiv_candidate();
        c.abstract_text = Some(
            "A benchmark for image classification and computer vision models.".into(),
        );
        assert_eq!(prefilter().check(&c), FilterReason::KeywordRule);
    }

    #[test]
    fn missing_required_keyword_rejects() {
        let mut c = arxiv_candidate();
        c.title = "A study of bird migration".into();
        c.abstract_text = Some("We observe seasonal movement patterns of geese.".into());
        assert_eq!(prefilter().check(&c), FilterReason::KeywordRule);
    }

    #[test]
    fn github_fresh_repo_star_boundary() {
        let mut c = github_candidate();
        c.raw_metadata.insert(
            "created_at".into(),
            (Utc::now() - chrono::Duration::days(3)).to_rfc3339(),
        );
        c.github_stars = Some(5);
        assert_eq!(prefilter().check(&c), FilterReason::Pass);
        c.github_stars = Some(4);
        assert_eq!(prefilter().check(&c), FilterReason::GithubQuality);
    }

    #[test]
    fn github_stale_push_rejected() {
        let mut c = github_candidate();
        c.publish_date = Some(Utc::now() - chrono::Duration::days(120));
        assert_eq!(prefilter().check(&c), FilterReason::GithubQuality);
    }

    #[test]
    fn github_short_readme_rejected() {
        let mut c = github_candidate();
        c.abstract_text = Some("benchmark agent code short readme".into());
        assert_eq!(prefilter().check(&c), FilterReason::GithubQuality);
    }

    #[test]
    fn awesome_list_rejected() {
        let mut c = github_candidate();
        c.title = "org/awesome-agent-benchmarks".into();
        assert_eq!(prefilter().check(&c), FilterReason::CuratedList);
    }

    #[test]
    fn tool_suffix_rejected_without_benchmark_signal() {
        let mut c = github_candidate();
        c.title = "org/agent-api-client".into();
        c.abstract_text = Some(format!(
            "A client library for calling agent APIs with performance in mind. {}",
            "filler ".repeat(80)
        ));
        assert_eq!(prefilter().check(&c), FilterReason::ToolRepo);
    }

    #[test]
    fn tool_suffix_overridden_by_strong_signal() {
        let mut c = github_candidate();
        c.title = "org/tokenizer-parser".into();
        c.abstract_text = Some(format!(
            "An evaluation benchmark with a benchmark dataset and leaderboard. {}",
            "filler ".repeat(80)
        ));
        assert_eq!(prefilter().check(&c), FilterReason::Pass);
    }

    #[test]
    fn batch_tallies_reasons_and_sources() {
        let mut short = arxiv_candidate();
        short.title = "short".into();
        let outcome = prefilter().filter_batch(vec![arxiv_candidate(), short, github_candidate()]);
        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.reasons.get("pass"), Some(&2));
        assert_eq!(outcome.reasons.get("title_short"), Some(&1));
        assert_eq!(outcome.per_source.get("arxiv"), Some(&(2, 1)));
        assert_eq!(outcome.per_source.get("github"), Some(&(1, 1)));
    }

    #[test]
    fn star_threshold_table() {
        assert_eq!(dynamic_star_threshold(3), 5);
        assert_eq!(dynamic_star_threshold(7), 5);
        assert_eq!(dynamic_star_threshold(8), 15);
        assert_eq!(dynamic_star_threshold(30), 15);
        assert_eq!(dynamic_star_threshold(31), 30);
        assert_eq!(dynamic_star_threshold(90), 30);
        assert_eq!(dynamic_star_threshold(91), 50);
    }
}
