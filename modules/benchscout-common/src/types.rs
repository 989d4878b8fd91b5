use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{ALGORITHM_PAPER_PENALTY, NON_BENCHMARK_PENALTY};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Arxiv,
    Github,
    Huggingface,
    Helm,
    Techempower,
    Dbengines,
    SemanticScholar,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Arxiv => write!(f, "arxiv"),
            Source::Github => write!(f, "github"),
            Source::Huggingface => write!(f, "huggingface"),
            Source::Helm => write!(f, "helm"),
            Source::Techempower => write!(f, "techempower"),
            Source::Dbengines => write!(f, "dbengines"),
            Source::SemanticScholar => write!(f, "semantic_scholar"),
        }
    }
}

impl Source {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "arxiv" => Some(Self::Arxiv),
            "github" => Some(Self::Github),
            "huggingface" => Some(Self::Huggingface),
            "helm" => Some(Self::Helm),
            "techempower" => Some(Self::Techempower),
            "dbengines" | "db-engines" => Some(Self::Dbengines),
            "semantic_scholar" | "semanticscholar" => Some(Self::SemanticScholar),
            _ => None,
        }
    }

    /// Sources whose upstream curation is good enough to skip keyword rules.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Helm | Self::Techempower | Self::Dbengines)
    }

    /// Sources whose upstream descriptions are legitimately short.
    pub fn short_abstract_allowed(&self) -> bool {
        matches!(self, Self::Helm | Self::SemanticScholar | Self::Huggingface)
    }

    /// Human display name used in notifications.
    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Arxiv => "arXiv",
            Source::Github => "GitHub",
            Source::Huggingface => "HuggingFace",
            Source::Helm => "HELM",
            Source::Techempower => "TechEmpower",
            Source::Dbengines => "DB-Engines",
            Source::SemanticScholar => "Semantic Scholar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Priority is a pure function of the (post-penalty) total score.
    pub fn from_score(total: f64) -> Self {
        if total >= 8.0 {
            Priority::High
        } else if total >= 6.0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum NonBenchmarkCategory {
    AlgorithmPaper,
    SystemFramework,
    ToolSdk,
    ModelRelease,
    #[default]
    Empty,
}

impl NonBenchmarkCategory {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "algorithm_paper" => Self::AlgorithmPaper,
            "system_framework" => Self::SystemFramework,
            "tool_sdk" => Self::ToolSdk,
            "model_release" => Self::ModelRelease,
            _ => Self::Empty,
        }
    }
}

impl std::fmt::Display for NonBenchmarkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlgorithmPaper => write!(f, "algorithm_paper"),
            Self::SystemFramework => write!(f, "system_framework"),
            Self::ToolSdk => write!(f, "tool_sdk"),
            Self::ModelRelease => write!(f, "model_release"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

// --- Candidate records ---

/// A discovered item as mapped out of a single upstream source.
/// One struct with nullable fields plus the `source` tag; collectors fill
/// whichever fields their upstream carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: String,
    pub url: String,
    pub source: Source,
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub github_stars: Option<u64>,
    pub github_url: Option<String>,
    pub dataset_url: Option<String>,
    pub paper_url: Option<String>,
    pub license_type: Option<String>,
    pub task_type: Option<String>,
    #[serde(default)]
    pub evaluation_metrics: Vec<String>,
    #[serde(default)]
    pub raw_baselines: Vec<String>,
    pub raw_institutions: Option<String>,
    pub raw_dataset_size: Option<String>,
    /// Free-form enrichment map (evaluation_summary, dataset_summary, ...).
    #[serde(default)]
    pub raw_metadata: BTreeMap<String, String>,
    pub hero_image_url: Option<String>,
    /// Identifier returned by the chat platform after image upload.
    pub hero_image_key: Option<String>,
}

impl RawCandidate {
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: Source) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            source,
            abstract_text: None,
            authors: Vec::new(),
            publish_date: None,
            github_stars: None,
            github_url: None,
            dataset_url: None,
            paper_url: None,
            license_type: None,
            task_type: None,
            evaluation_metrics: Vec::new(),
            raw_baselines: Vec::new(),
            raw_institutions: None,
            raw_dataset_size: None,
            raw_metadata: BTreeMap::new(),
            hero_image_url: None,
            hero_image_key: None,
        }
    }

    /// Lowercased `title + abstract` haystack used by keyword rules.
    pub fn keyword_haystack(&self) -> String {
        let mut text = self.title.to_lowercase();
        if let Some(ref abs) = self.abstract_text {
            text.push(' ');
            text.push_str(&abs.to_lowercase());
        }
        text
    }
}

// --- Scoring output ---

/// Weighted contribution of each required scoring dimension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub activity: f64,
    pub reproducibility: f64,
    pub license: f64,
    pub novelty: f64,
    pub relevance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            activity: 0.15,
            reproducibility: 0.30,
            license: 0.15,
            novelty: 0.15,
            relevance: 0.25,
        }
    }
}

impl ScoreWeights {
    pub fn weighted_total(&self, s: &ScoreSet) -> f64 {
        s.activity * self.activity
            + s.reproducibility * self.reproducibility
            + s.license * self.license
            + s.novelty * self.novelty
            + s.relevance * self.relevance
    }
}

/// Everything the scorer attaches to a candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreSet {
    pub activity: f64,
    pub activity_reasoning: String,
    pub reproducibility: f64,
    pub reproducibility_reasoning: String,
    pub license: f64,
    pub license_reasoning: String,
    pub novelty: f64,
    pub novelty_reasoning: String,
    pub relevance: f64,
    pub relevance_reasoning: String,

    // Present only when the model classified the candidate as a backend benchmark.
    pub backend_fit: Option<f64>,
    pub backend_fit_reasoning: Option<String>,
    pub backend_engineering: Option<f64>,
    pub backend_engineering_reasoning: Option<String>,

    pub is_not_benchmark: bool,
    #[serde(default)]
    pub non_benchmark_category: NonBenchmarkCategory,
    pub tool_reasoning: String,

    pub task_domain: String,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub baselines: Vec<String>,
    pub institution: Option<String>,
    pub dataset_size: Option<i64>,

    pub overall_reasoning: String,

    /// True when the rule-based fallback produced these scores.
    #[serde(default)]
    pub fallback: bool,
}

impl ScoreSet {
    /// Penalty subtracted from the weighted sum for non-benchmark items.
    pub fn penalty(&self) -> f64 {
        if self.non_benchmark_category == NonBenchmarkCategory::AlgorithmPaper {
            ALGORITHM_PAPER_PENALTY
        } else if self.is_not_benchmark {
            NON_BENCHMARK_PENALTY
        } else {
            0.0
        }
    }
}

/// A candidate after scoring. `total_score` is fixed at scoring time so that
/// `priority()` stays a pure function of it regardless of later weight changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub raw: RawCandidate,
    #[serde(flatten)]
    pub scores: ScoreSet,
    pub total_score: f64,
}

impl ScoredCandidate {
    pub fn from_parts(raw: RawCandidate, scores: ScoreSet, weights: &ScoreWeights) -> Self {
        let total = (weights.weighted_total(&scores) - scores.penalty()).clamp(0.0, 10.0);
        Self {
            raw,
            scores,
            total_score: total,
        }
    }

    pub fn priority(&self) -> Priority {
        Priority::from_score(self.total_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_scores(v: f64) -> ScoreSet {
        ScoreSet {
            activity: v,
            reproducibility: v,
            license: v,
            novelty: v,
            relevance: v,
            ..ScoreSet::default()
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let w = ScoreWeights::default();
        let sum = w.activity + w.reproducibility + w.license + w.novelty + w.relevance;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn priority_thresholds() {
        assert_eq!(Priority::from_score(8.0), Priority::High);
        assert_eq!(Priority::from_score(7.99), Priority::Medium);
        assert_eq!(Priority::from_score(6.0), Priority::Medium);
        assert_eq!(Priority::from_score(5.99), Priority::Low);
        assert_eq!(Priority::from_score(0.0), Priority::Low);
        assert_eq!(Priority::from_score(10.0), Priority::High);
    }

    #[test]
    fn algorithm_paper_penalty_drops_priority() {
        // Pre-penalty weighted sum of 8.0 must land at 3.0 => low priority.
        let mut scores = uniform_scores(8.0);
        scores.is_not_benchmark = true;
        scores.non_benchmark_category = NonBenchmarkCategory::AlgorithmPaper;
        let raw = RawCandidate::new(
            "RPM-MCTS: A New Method for Code Generation",
            "https://arxiv.org/abs/2400.00001",
            Source::Arxiv,
        );
        let scored = ScoredCandidate::from_parts(raw, scores, &ScoreWeights::default());
        assert!((scored.total_score - 3.0).abs() < 1e-9);
        assert_eq!(scored.priority(), Priority::Low);
    }

    #[test]
    fn generic_non_benchmark_penalty_is_three() {
        let mut scores = uniform_scores(8.0);
        scores.is_not_benchmark = true;
        scores.non_benchmark_category = NonBenchmarkCategory::ToolSdk;
        let raw = RawCandidate::new("some tool sdk", "https://example.com", Source::Github);
        let scored = ScoredCandidate::from_parts(raw, scores, &ScoreWeights::default());
        assert!((scored.total_score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn benchmark_methodology_keeps_full_score() {
        // is_not_benchmark=false => no penalty even for methodology papers.
        let scores = uniform_scores(8.0);
        let raw = RawCandidate::new(
            "Semantic-KG: A Method for Constructing Semantic Benchmarks",
            "https://arxiv.org/abs/2400.00002",
            Source::Arxiv,
        );
        let scored = ScoredCandidate::from_parts(raw, scores, &ScoreWeights::default());
        assert!((scored.total_score - 8.0).abs() < 1e-9);
        assert_eq!(scored.priority(), Priority::High);
    }

    #[test]
    fn total_score_clamped_to_range() {
        let mut scores = uniform_scores(1.0);
        scores.is_not_benchmark = true;
        scores.non_benchmark_category = NonBenchmarkCategory::AlgorithmPaper;
        let raw = RawCandidate::new("tiny", "https://example.com", Source::Arxiv);
        let scored = ScoredCandidate::from_parts(raw, scores, &ScoreWeights::default());
        assert_eq!(scored.total_score, 0.0);
    }

    #[test]
    fn source_serde_snake_case() {
        let json = serde_json::to_string(&Source::SemanticScholar).unwrap();
        assert_eq!(json, "\"semantic_scholar\"");
        let back: Source = serde_json::from_str("\"dbengines\"").unwrap();
        assert_eq!(back, Source::Dbengines);
    }

    #[test]
    fn trusted_sources() {
        assert!(Source::Helm.is_trusted());
        assert!(Source::Techempower.is_trusted());
        assert!(Source::Dbengines.is_trusted());
        assert!(!Source::Arxiv.is_trusted());
        assert!(!Source::Github.is_trusted());
    }

    #[test]
    fn scored_candidate_roundtrips_through_json() {
        let raw = RawCandidate::new("A benchmark", "https://example.com", Source::Github);
        let scored =
            ScoredCandidate::from_parts(raw, uniform_scores(7.0), &ScoreWeights::default());
        let json = serde_json::to_string(&scored).unwrap();
        let back: ScoredCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.raw.title, "A benchmark");
        assert!((back.total_score - 7.0).abs() < 1e-9);
    }
}
