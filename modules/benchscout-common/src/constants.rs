//! Shared tuning constants. Anything a deployment is likely to override lives
//! in `SourcesConfig` instead; these are the defaults behind it.

// ---- arXiv ----
pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
pub const ARXIV_PDF_BASE: &str = "https://arxiv.org/pdf";
pub const ARXIV_MAX_RESULTS: usize = 50;
pub const ARXIV_TIMEOUT_SECS: u64 = 20;
pub const ARXIV_MAX_RETRIES: u32 = 2;
pub const ARXIV_LOOKBACK_HOURS: i64 = 168;
pub const ARXIV_KEYWORDS: &[&str] = &[
    "code generation benchmark",
    "code evaluation",
    "programming benchmark",
    "software engineering benchmark",
    "program synthesis evaluation",
    "code completion benchmark",
    "web agent benchmark",
    "browser automation benchmark",
    "web navigation evaluation",
    "gui automation benchmark",
    "multi-agent benchmark",
    "agent collaboration evaluation",
    "tool use benchmark",
    "api usage benchmark",
    "backend development benchmark",
    "api design benchmark",
    "restful api evaluation",
    "database query benchmark",
    "sql optimization benchmark",
    "microservices benchmark",
    "distributed systems benchmark",
    "system design evaluation",
    "backend framework benchmark",
    "server performance benchmark",
    "web framework comparison",
];
pub const ARXIV_CATEGORIES: &[&str] = &["cs.SE", "cs.AI", "cs.CL", "cs.DC", "cs.DB", "cs.NI"];

// ---- GitHub ----
pub const GITHUB_SEARCH_API: &str = "https://api.github.com/search/repositories";
pub const GITHUB_TIMEOUT_SECS: u64 = 5;
pub const GITHUB_MAX_RETRIES: u32 = 3;
pub const GITHUB_RETRY_DELAY_SECS: u64 = 2;
pub const GITHUB_LOOKBACK_DAYS: i64 = 30;
pub const GITHUB_MIN_README_LENGTH: usize = 500;
pub const GITHUB_MAX_DAYS_SINCE_PUSH: i64 = 90;
pub const GITHUB_RESULTS_PER_TOPIC: usize = 5;
pub const GITHUB_TOPIC_CONCURRENCY: usize = 5;
pub const GITHUB_TOPICS: &[&str] = &[
    "code-generation",
    "code-benchmark",
    "program-synthesis",
    "software-testing",
    "web-automation",
    "browser-automation",
    "web-agent",
    "gui-automation",
    "agent-benchmark",
    "multi-agent",
    "llm-agent",
    "backend-benchmark",
    "api-benchmark",
    "database-benchmark",
    "microservices-benchmark",
    "distributed-systems",
    "performance-testing",
    "load-testing",
    "web-framework-benchmark",
    "database-performance",
    "sql-benchmark",
];
pub const GITHUB_TOPIC_BLACKLIST: &[&str] = &[
    "awesome",
    "awesome-list",
    "tutorial",
    "course",
    "roadmap",
    "interview",
    "cheatsheet",
];
pub const GITHUB_README_FEATURE_KEYWORDS: &[&str] = &[
    "benchmark",
    "evaluation",
    "test set",
    "dataset",
    "leaderboard",
    "baseline",
    "performance",
    "comparison",
    "ranking",
    "test suite",
    "metric",
];
pub const GITHUB_CURATED_PATTERNS: &[&str] = &[
    "curated list",
    "collection of",
    "list of tools",
    "awesome list",
    "resources list",
];
pub const GITHUB_TOOL_SUFFIXES: &[&str] = &[
    "-lib",
    "-library",
    "-client",
    "-sdk",
    "-wrapper",
    "-tool",
    "-utils",
    "-helper",
    "-connector",
    "-adapter",
    "-parser",
    "-tokenizer",
];
pub const STRONG_BENCHMARK_SIGNALS: &[&str] = &[
    "benchmark dataset",
    "evaluation benchmark",
    "test set",
    "leaderboard",
    "benchmark suite",
    "evaluation suite",
];

// ---- HuggingFace ----
pub const HUGGINGFACE_DATASETS_API: &str = "https://huggingface.co/api/datasets";
pub const HUGGINGFACE_TIMEOUT_SECS: u64 = 15;
pub const HUGGINGFACE_MAX_RETRIES: u32 = 3;
pub const HUGGINGFACE_MIN_DOWNLOADS: u64 = 100;
pub const HUGGINGFACE_MAX_RESULTS: usize = 50;
pub const HUGGINGFACE_LOOKBACK_DAYS: i64 = 14;
pub const HUGGINGFACE_KEYWORDS: &[&str] = &[
    "code",
    "programming",
    "software",
    "benchmark",
    "backend",
    "api",
    "database",
    "sql",
    "microservices",
    "system-design",
];

// ---- HELM ----
pub const HELM_BASE_PAGE: &str = "https://crfm.stanford.edu/helm/classic/latest/";
pub const HELM_STORAGE_BASE: &str =
    "https://storage.googleapis.com/crfm-helm-public/benchmark_output";
pub const HELM_DEFAULT_RELEASE: &str = "v0.4.0";
pub const HELM_TIMEOUT_SECS: u64 = 20;
pub const HELM_ALLOWED_SCENARIOS: &[&str] = &[
    "code", "coding", "program", "reasoning", "math", "logic", "tool", "api", "agent", "web",
    "browser", "gui",
];
pub const HELM_EXCLUDED_SCENARIOS: &[&str] = &[
    "qa",
    "question",
    "answer",
    "reading",
    "comprehension",
    "dialogue",
    "conversation",
    "summarization",
    "summary",
    "translation",
    "sentiment",
    "classification",
    "image",
    "vision",
    "video",
];

// ---- TechEmpower ----
pub const TECHEMPOWER_BASE_URL: &str = "https://tfb-status.techempower.com";
pub const TECHEMPOWER_TIMEOUT_SECS: u64 = 15;
pub const TECHEMPOWER_MIN_COMPOSITE_SCORE: f64 = 50.0;
pub const TECHEMPOWER_SCORE_SCALE: f64 = 100_000.0;
pub const TECHEMPOWER_RUNS_LIMIT: usize = 3;

// ---- DB-Engines ----
pub const DBENGINES_BASE_URL: &str = "https://db-engines.com/en";
pub const DBENGINES_TIMEOUT_SECS: u64 = 15;
pub const DBENGINES_MAX_RESULTS: usize = 50;

// ---- Semantic Scholar ----
pub const SEMANTIC_SCHOLAR_API: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
pub const SEMANTIC_SCHOLAR_TIMEOUT_SECS: u64 = 15;
pub const SEMANTIC_SCHOLAR_MAX_RESULTS: usize = 100;
pub const SEMANTIC_SCHOLAR_KEYWORDS: &[&str] =
    &["benchmark", "evaluation", "dataset", "leaderboard", "test set"];

// ---- Prefilter ----
pub const PREFILTER_MIN_TITLE_LENGTH: usize = 10;
pub const PREFILTER_MIN_ABSTRACT_LENGTH: usize = 20;
pub const PREFILTER_REQUIRED_KEYWORDS: &[&str] = &[
    "code",
    "coding",
    "program",
    "programming",
    "software",
    "repository",
    "web",
    "browser",
    "gui",
    "ui",
    "automation",
    "agent",
    "multi-agent",
    "tool",
    "api",
    "workflow",
    "performance",
    "benchmark",
    "framework",
    "database",
    "latency",
    "throughput",
    "optimization",
    "http",
    "server",
    "service",
    "endpoint",
    "query",
    "storage",
    "reasoning",
    "math",
    "logic",
];
pub const PREFILTER_EXCLUDED_KEYWORDS: &[&str] = &[
    "translation",
    "summarization",
    "sentiment analysis",
    "text classification",
    "dialogue system",
    "conversational ai",
    "chatbot tutorial",
    "speech recognition",
    "audio processing",
    "image classification",
    "computer vision",
    "video processing",
    "awesome list",
    "curated list",
    "collection of resources",
    "list of tools",
    "tutorial series",
    "online course",
    "learning guide",
    "sdk wrapper",
    "api wrapper library",
];

// ---- Scorer ----
pub const SCORE_CONCURRENCY: usize = 50;
pub const LLM_TIMEOUT_SECS: u64 = 30;
pub const LLM_MAX_RETRIES: u32 = 3;
pub const LLM_MAX_TOKENS: u32 = 4096;
pub const REASONING_MIN_CHARS: usize = 150;
pub const BACKEND_REASONING_MIN_CHARS: usize = 200;
pub const TOOL_REASONING_MIN_CHARS: usize = 100;
pub const OVERALL_REASONING_MIN_CHARS: usize = 50;
pub const REPAIR_MAX_ATTEMPTS: u32 = 2;
pub const SCORE_CACHE_TTL_SECS: u64 = 7 * 24 * 3600;
pub const NON_BENCHMARK_PENALTY: f64 = 3.0;
pub const ALGORITHM_PAPER_PENALTY: f64 = 5.0;

pub const TASK_DOMAINS: &[&str] = &[
    "Coding",
    "WebDev",
    "Backend",
    "GUI",
    "ToolUse",
    "Collaboration",
    "AgentOps",
    "Reasoning",
    "DeepResearch",
    "Other",
];
pub const DEFAULT_TASK_DOMAIN: &str = "Other";

// ---- PDF enhancer ----
pub const PDF_PARSE_CONCURRENCY: usize = 3;
pub const PDF_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
pub const PDF_DOWNLOAD_MAX_RETRIES: u32 = 2;
pub const SECTION_SUMMARY_MAX_CHARS: usize = 1000;
pub const COVER_IMAGE_DPI: f32 = 150.0;
pub const IMAGE_KEY_CACHE_TTL_SECS: u64 = 30 * 24 * 3600;

// ---- Storage ----
pub const GRID_BATCH_SIZE: usize = 20;
pub const GRID_BATCH_PACING_SECS: f64 = 0.6;
pub const GRID_HTTP_TIMEOUT_SECS: u64 = 15;
pub const GRID_MAX_RETRIES: u32 = 3;
pub const GRID_RETRY_INITIAL_DELAY_SECS: f64 = 1.5;
pub const GRID_TOKEN_EARLY_REFRESH_SECS: i64 = 300;
pub const FALLBACK_RETENTION_DAYS: i64 = 7;

/// Dedup lookback for rows already in the primary store, by source, in days.
pub fn dedup_window_days(source: crate::types::Source) -> i64 {
    match source {
        crate::types::Source::Arxiv => 7,
        crate::types::Source::Huggingface => 14,
        crate::types::Source::Github => 30,
        _ => 60,
    }
}

// ---- Notifier ----
pub const MAX_NOTIFY_COUNT: u32 = 3;
pub const NOTIFY_CARD_TOP_K: usize = 3;
pub const NOTIFY_SUMMARY_TOP_K: usize = 5;
pub const NOTIFY_PACING_SECS: f64 = 0.5;
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;
pub const REASONING_PREVIEW_CHARS: usize = 1500;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;

    #[test]
    fn dedup_windows_per_source() {
        assert_eq!(dedup_window_days(Source::Arxiv), 7);
        assert_eq!(dedup_window_days(Source::Huggingface), 14);
        assert_eq!(dedup_window_days(Source::Github), 30);
        assert_eq!(dedup_window_days(Source::Helm), 60);
        assert_eq!(dedup_window_days(Source::Techempower), 60);
    }
}
