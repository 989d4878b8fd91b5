use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants;
use crate::types::ScoreWeights;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // LLM scoring
    pub anthropic_api_key: String,
    pub llm_model: String,

    // Grid (primary spreadsheet backend)
    pub grid_base_url: String,
    pub grid_app_id: String,
    pub grid_app_secret: String,
    pub grid_app_token: String,
    pub grid_table_id: String,
    /// Human-facing table URL linked from notification cards.
    pub grid_table_url: Option<String>,

    // Notifications
    pub webhook_url: Option<String>,

    // Optional services
    pub redis_url: Option<String>,
    pub github_token: Option<String>,
    pub huggingface_token: Option<String>,
    /// Structured PDF parsing service; enhancement is skipped without it.
    pub parse_service_url: Option<String>,

    // Local state
    pub sqlite_path: PathBuf,
    pub history_path: PathBuf,
    pub log_dir: PathBuf,
    pub pdf_cache_dir: PathBuf,

    pub sources: SourcesConfig,
}

impl Config {
    /// Load configuration from environment variables plus the per-source YAML
    /// file. Panics with a clear message if required vars are missing — the
    /// pipeline refuses to start on invalid configuration.
    pub fn from_env() -> Self {
        let sources_path =
            PathBuf::from(env::var("SOURCES_CONFIG").unwrap_or_else(|_| "config/sources.yaml".into()));
        Self {
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            llm_model: env::var("LLM_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
            grid_base_url: env::var("GRID_BASE_URL")
                .unwrap_or_else(|_| "https://open.feishu.cn/open-apis".to_string()),
            grid_app_id: required_env("GRID_APP_ID"),
            grid_app_secret: required_env("GRID_APP_SECRET"),
            grid_app_token: required_env("GRID_APP_TOKEN"),
            grid_table_id: required_env("GRID_TABLE_ID"),
            grid_table_url: env::var("GRID_TABLE_URL").ok(),
            webhook_url: env::var("WEBHOOK_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),
            github_token: env::var("GITHUB_TOKEN").ok(),
            huggingface_token: env::var("HUGGINGFACE_TOKEN").ok(),
            parse_service_url: env::var("PARSE_SERVICE_URL").ok(),
            sqlite_path: PathBuf::from(
                env::var("SQLITE_PATH").unwrap_or_else(|_| "fallback.db".to_string()),
            ),
            history_path: PathBuf::from(
                env::var("HISTORY_PATH").unwrap_or_else(|_| "notification_history.db".to_string()),
            ),
            log_dir: PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string())),
            pdf_cache_dir: PathBuf::from(
                env::var("PDF_CACHE_DIR").unwrap_or_else(|_| "data/pdf-cache".to_string()),
            ),
            sources: SourcesConfig::load(&sources_path),
        }
    }

    /// Log the presence of each sensitive env var without exposing values.
    pub fn log_redacted(&self) {
        let vars = [
            ("ANTHROPIC_API_KEY", self.anthropic_api_key.len()),
            ("GRID_APP_ID", self.grid_app_id.len()),
            ("GRID_APP_SECRET", self.grid_app_secret.len()),
            ("GRID_APP_TOKEN", self.grid_app_token.len()),
            ("GRID_TABLE_ID", self.grid_table_id.len()),
        ];
        for (name, len) in vars {
            if len == 0 {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({len} chars)");
            }
        }
        tracing::info!(
            webhook = self.webhook_url.is_some(),
            redis = self.redis_url.is_some(),
            github_token = self.github_token.is_some(),
            parse_service = self.parse_service_url.is_some(),
            "optional services"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

// ---------------------------------------------------------------------------
// Per-source configuration (config/sources.yaml)
// ---------------------------------------------------------------------------

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    pub enabled: bool,
    pub max_results: usize,
    pub lookback_hours: i64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: constants::ARXIV_MAX_RESULTS,
            lookback_hours: constants::ARXIV_LOOKBACK_HOURS,
            timeout_seconds: constants::ARXIV_TIMEOUT_SECS,
            max_retries: constants::ARXIV_MAX_RETRIES,
            keywords: strings(constants::ARXIV_KEYWORDS),
            categories: strings(constants::ARXIV_CATEGORIES),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub enabled: bool,
    pub topics: Vec<String>,
    pub results_per_topic: usize,
    pub lookback_days: i64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub min_readme_length: usize,
    pub topic_blacklist: Vec<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topics: strings(constants::GITHUB_TOPICS),
            results_per_topic: constants::GITHUB_RESULTS_PER_TOPIC,
            lookback_days: constants::GITHUB_LOOKBACK_DAYS,
            timeout_seconds: constants::GITHUB_TIMEOUT_SECS,
            max_retries: constants::GITHUB_MAX_RETRIES,
            min_readme_length: constants::GITHUB_MIN_README_LENGTH,
            topic_blacklist: strings(constants::GITHUB_TOPIC_BLACKLIST),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HuggingfaceConfig {
    pub enabled: bool,
    pub keywords: Vec<String>,
    pub min_downloads: u64,
    pub max_results: usize,
    pub lookback_days: i64,
    pub timeout_seconds: u64,
}

impl Default for HuggingfaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: strings(constants::HUGGINGFACE_KEYWORDS),
            min_downloads: constants::HUGGINGFACE_MIN_DOWNLOADS,
            max_results: constants::HUGGINGFACE_MAX_RESULTS,
            lookback_days: constants::HUGGINGFACE_LOOKBACK_DAYS,
            timeout_seconds: constants::HUGGINGFACE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HelmConfig {
    pub enabled: bool,
    pub base_url: String,
    pub storage_base: String,
    pub default_release: String,
    pub timeout_seconds: u64,
    pub allowed_scenarios: Vec<String>,
    pub excluded_scenarios: Vec<String>,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: constants::HELM_BASE_PAGE.to_string(),
            storage_base: constants::HELM_STORAGE_BASE.to_string(),
            default_release: constants::HELM_DEFAULT_RELEASE.to_string(),
            timeout_seconds: constants::HELM_TIMEOUT_SECS,
            allowed_scenarios: strings(constants::HELM_ALLOWED_SCENARIOS),
            excluded_scenarios: strings(constants::HELM_EXCLUDED_SCENARIOS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TechempowerConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub min_composite_score: f64,
}

impl Default for TechempowerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: constants::TECHEMPOWER_BASE_URL.to_string(),
            timeout_seconds: constants::TECHEMPOWER_TIMEOUT_SECS,
            min_composite_score: constants::TECHEMPOWER_MIN_COMPOSITE_SCORE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbenginesConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_results: usize,
}

impl Default for DbenginesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: constants::DBENGINES_BASE_URL.to_string(),
            timeout_seconds: constants::DBENGINES_TIMEOUT_SECS,
            max_results: constants::DBENGINES_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SemanticScholarConfig {
    pub enabled: bool,
    pub keywords: Vec<String>,
    pub max_results: usize,
    pub timeout_seconds: u64,
}

impl Default for SemanticScholarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keywords: strings(constants::SEMANTIC_SCHOLAR_KEYWORDS),
            max_results: constants::SEMANTIC_SCHOLAR_MAX_RESULTS,
            timeout_seconds: constants::SEMANTIC_SCHOLAR_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub concurrency: usize,
    pub weights: ScoreWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            concurrency: constants::SCORE_CONCURRENCY,
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub arxiv: ArxivConfig,
    pub github: GithubConfig,
    pub huggingface: HuggingfaceConfig,
    pub helm: HelmConfig,
    pub techempower: TechempowerConfig,
    pub dbengines: DbenginesConfig,
    pub semantic_scholar: SemanticScholarConfig,
    pub scoring: ScoringConfig,
}

impl SourcesConfig {
    /// Load from YAML, falling back to defaults when the file is missing or
    /// malformed. Collection behavior is tunable; absence is not an error.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return Self::default(),
        };
        match serde_yaml::from_str(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse sources config, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = SourcesConfig::default();
        assert!(cfg.arxiv.enabled);
        assert_eq!(cfg.arxiv.lookback_hours, 168);
        assert_eq!(cfg.huggingface.min_downloads, 100);
        assert_eq!(cfg.huggingface.lookback_days, 14);
        assert!(!cfg.semantic_scholar.enabled);
        assert_eq!(cfg.scoring.concurrency, 50);
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let yaml = r#"
arxiv:
  lookback_hours: 24
  keywords: ["agent benchmark"]
github:
  enabled: false
scoring:
  concurrency: 8
"#;
        let cfg: SourcesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.arxiv.lookback_hours, 24);
        assert_eq!(cfg.arxiv.keywords, vec!["agent benchmark"]);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.arxiv.max_results, 50);
        assert!(!cfg.github.enabled);
        assert_eq!(cfg.scoring.concurrency, 8);
        let w = cfg.scoring.weights;
        assert!((w.reproducibility - 0.30).abs() < 1e-9);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = SourcesConfig::load(Path::new("/nonexistent/sources.yaml"));
        assert!(cfg.helm.enabled);
        assert_eq!(cfg.dbengines.max_results, 50);
    }
}
