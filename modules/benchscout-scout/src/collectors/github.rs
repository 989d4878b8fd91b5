//! GitHub repository search collector. Fans out one search per configured
//! topic (bounded), fetches READMEs, and applies the collector-side quality
//! gate before emitting candidates.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use benchscout_common::config::GithubConfig;
use benchscout_common::constants::{
    GITHUB_README_FEATURE_KEYWORDS, GITHUB_SEARCH_API, GITHUB_TOPIC_CONCURRENCY,
};
use benchscout_common::{RawCandidate, Source};

use crate::prefilter::dynamic_star_threshold;

use super::{http_client, parse_datetime, Collector};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize, Clone)]
struct Repo {
    full_name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    pushed_at: Option<String>,
    #[serde(default)]
    license: Option<License>,
}

#[derive(Debug, Deserialize, Clone)]
struct License {
    #[serde(default)]
    name: Option<String>,
}

pub struct GithubCollector {
    cfg: GithubConfig,
    token: Option<String>,
    http: reqwest::Client,
    api_url: String,
    readme_cache: Mutex<HashMap<String, Option<String>>>,
}

impl GithubCollector {
    pub fn new(cfg: GithubConfig, token: Option<String>) -> Self {
        let http = http_client(cfg.timeout_seconds);
        Self {
            cfg,
            token,
            http,
            api_url: GITHUB_SEARCH_API.to_string(),
            readme_cache: Mutex::new(HashMap::new()),
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch_topic(&self, topic: &str) -> Result<Vec<RawCandidate>> {
        let pushed_floor = (Utc::now() - chrono::Duration::days(self.cfg.lookback_days))
            .format("%Y-%m-%d")
            .to_string();
        let query = format!("{topic} benchmark in:name,description,readme pushed:>={pushed_floor}");

        let response = self.search_with_retry(&query, topic).await?;

        let mut candidates = Vec::new();
        for repo in response.items {
            if !self.passes_repo_gate(&repo) {
                continue;
            }
            if let Some(candidate) = self.build_candidate(repo, topic).await {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    async fn search_with_retry(&self, query: &str, topic: &str) -> Result<SearchResponse> {
        let mut last_error = None;
        let per_page = self.cfg.results_per_topic.to_string();
        for attempt in 1..=self.cfg.max_retries.max(1) {
            let result = async {
                let resp = self
                    .auth(self.http.get(&self.api_url))
                    .header("Accept", "application/vnd.github+json")
                    .query(&[
                        ("q", query),
                        ("sort", "stars"),
                        ("order", "desc"),
                        ("per_page", per_page.as_str()),
                    ])
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(anyhow!("search HTTP {status}"));
                }
                Ok(resp.json::<SearchResponse>().await?)
            }
            .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(topic, attempt, max = self.cfg.max_retries, error = %e, "search failed");
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("search failed")))
    }

    /// Quality gate applied before the README fetch: forks and blacklisted
    /// topics are out, stars must clear the age-scaled floor, and the last
    /// push must sit inside the lookback window.
    fn passes_repo_gate(&self, repo: &Repo) -> bool {
        if repo.fork {
            debug!(repo = %repo.full_name, "skipped fork");
            return false;
        }

        let blacklist = &self.cfg.topic_blacklist;
        if repo
            .topics
            .iter()
            .any(|t| blacklist.iter().any(|b| t.eq_ignore_ascii_case(b)))
        {
            debug!(repo = %repo.full_name, "skipped blacklisted topic");
            return false;
        }

        let age_days = repo
            .created_at
            .as_deref()
            .and_then(parse_datetime)
            .map(|c| (Utc::now() - c).num_days())
            .unwrap_or(i64::MAX);
        if repo.stargazers_count < dynamic_star_threshold(age_days) {
            debug!(
                repo = %repo.full_name,
                stars = repo.stargazers_count,
                age_days,
                "skipped below star floor"
            );
            return false;
        }

        repo.pushed_at.as_deref().and_then(parse_datetime).is_some()
    }

    async fn build_candidate(&self, repo: Repo, topic: &str) -> Option<RawCandidate> {
        let readme = self.fetch_readme(&repo.full_name).await?;
        if readme.chars().count() < self.cfg.min_readme_length {
            debug!(repo = %repo.full_name, "skipped short README");
            return None;
        }

        let readme_lower = readme.to_lowercase();
        if !GITHUB_README_FEATURE_KEYWORDS
            .iter()
            .any(|kw| readme_lower.contains(kw))
        {
            debug!(repo = %repo.full_name, "skipped README without benchmark features");
            return None;
        }

        let pushed = repo.pushed_at.as_deref().and_then(parse_datetime);
        let mut candidate =
            RawCandidate::new(repo.full_name.clone(), repo.html_url.clone(), Source::Github);
        candidate.abstract_text = Some(clean_readme(&readme, 2000));
        candidate.publish_date = pushed;
        candidate.github_stars = Some(repo.stargazers_count);
        candidate.github_url = Some(repo.html_url.clone());
        candidate.license_type = repo.license.and_then(|l| l.name);
        candidate.task_type = classify_task_type(&readme_lower, repo.description.as_deref());
        candidate.evaluation_metrics = extract_metrics(&readme_lower);
        candidate.raw_baselines = extract_baselines(&readme_lower);
        candidate.raw_dataset_size = extract_dataset_size(&readme);
        candidate.dataset_url = extract_dataset_url(&readme);
        candidate.hero_image_url = extract_readme_image(&readme);
        candidate.raw_metadata.insert("topic".into(), topic.to_string());
        if let Some(lang) = repo.language {
            candidate.raw_metadata.insert("language".into(), lang);
        }
        if let Some(created) = repo.created_at {
            candidate.raw_metadata.insert("created_at".into(), created);
        }
        Some(candidate)
    }

    async fn fetch_readme(&self, full_name: &str) -> Option<String> {
        {
            let cache = self.readme_cache.lock().await;
            if let Some(cached) = cache.get(full_name) {
                return cached.clone();
            }
        }

        let url = format!("https://api.github.com/repos/{full_name}/readme");
        let result = async {
            let resp = self
                .auth(self.http.get(&url))
                .header("Accept", "application/vnd.github.raw")
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("readme HTTP {status}"));
            }
            Ok::<_, anyhow::Error>(resp.text().await?)
        }
        .await;

        let readme = match result {
            Ok(text) => {
                let mut text = text;
                text.truncate(floor_char_boundary(&text, 10_000));
                Some(text)
            }
            Err(e) => {
                debug!(repo = full_name, error = %e, "README fetch failed");
                None
            }
        };

        let mut cache = self.readme_cache.lock().await;
        cache.insert(full_name.to_string(), readme.clone());
        readme
    }
}

#[async_trait]
impl Collector for GithubCollector {
    fn name(&self) -> &'static str {
        "github"
    }

    fn source(&self) -> Source {
        Source::Github
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let results: Vec<(String, Result<Vec<RawCandidate>>)> =
            stream::iter(self.cfg.topics.iter().cloned().map(|topic| async move {
                (topic.clone(), self.fetch_topic(&topic).await)
            }))
            .buffer_unordered(GITHUB_TOPIC_CONCURRENCY)
            .collect()
            .await;

        let mut candidates = Vec::new();
        let mut failed_topics = 0;
        for (topic, result) in results {
            match result {
                Ok(mut batch) => candidates.append(&mut batch),
                Err(e) => {
                    failed_topics += 1;
                    warn!(topic = %topic, error = %e, "topic search failed, partial results kept");
                }
            }
        }

        info!(
            count = candidates.len(),
            failed_topics, "github collection complete"
        );
        Ok(candidates)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Strip markdown/HTML noise that pollutes downstream display.
fn clean_readme(readme: &str, max_chars: usize) -> String {
    static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
    static IMAGE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    let no_images = IMAGE_RE.replace_all(readme, "");
    let no_tags = HTML_TAG_RE.replace_all(&no_images, "");
    let cleaned = no_tags
        .replace("```", " ")
        .replace("**", "")
        .replace("##", "");
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

static METRIC_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"pass@\d+", "Pass@k"),
        (r"\bbleu(?:-\d+)?\b", "BLEU"),
        (r"\brouge(?:-[l1-3])?\b", "ROUGE"),
        (r"\bf1[\s-]?score\b", "F1-Score"),
        (r"\baccuracy\b", "Accuracy"),
        (r"\bprecision\b", "Precision"),
        (r"\brecall\b", "Recall"),
        (r"\bexact match\b", "Exact Match"),
        (r"\bsuccess rate\b", "Success Rate"),
        (r"\blatency\b", "Latency"),
        (r"\bthroughput\b", "Throughput"),
    ]
    .iter()
    .map(|(p, label)| (Regex::new(p).expect("valid regex"), *label))
    .collect()
});

fn extract_metrics(readme_lower: &str) -> Vec<String> {
    let mut metrics = Vec::new();
    for (re, label) in METRIC_PATTERNS.iter() {
        if re.is_match(readme_lower) && !metrics.iter().any(|m| m == label) {
            metrics.push(label.to_string());
        }
        if metrics.len() >= 5 {
            break;
        }
    }
    metrics
}

static BASELINE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"gpt-4(?:-turbo|o)?", "GPT-4"),
        (r"gpt-3\.5(?:-turbo)?", "GPT-3.5"),
        (r"claude[\s-]?(?:opus|sonnet|haiku|3|4)?", "Claude"),
        (r"\bllama[-\s]?\d", "Llama"),
        (r"\bstarcoder\b", "StarCoder"),
        (r"\bcodex\b", "Codex"),
        (r"\bmistral\b", "Mistral"),
        (r"\bdeepseek\b", "DeepSeek"),
        (r"\bqwen\b", "Qwen"),
    ]
    .iter()
    .map(|(p, label)| (Regex::new(p).expect("valid regex"), *label))
    .collect()
});

fn extract_baselines(readme_lower: &str) -> Vec<String> {
    let mut baselines = Vec::new();
    for (re, label) in BASELINE_PATTERNS.iter() {
        if re.is_match(readme_lower) && !baselines.iter().any(|b| b == label) {
            baselines.push(label.to_string());
        }
        if baselines.len() >= 5 {
            break;
        }
    }
    baselines
}

fn extract_dataset_size(readme: &str) -> Option<String> {
    static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b\d{1,3}(?:[,\s]\d{3})*(?:\s*[km])?\s*(?:samples?|problems?|questions?|tasks?|examples?|test\s+cases?)\b")
            .expect("valid regex")
    });
    SIZE_RE.find(readme).map(|m| m.as_str().trim().to_string())
}

fn extract_dataset_url(readme: &str) -> Option<String> {
    static DATASET_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"https?://(?:huggingface\.co/datasets|zenodo\.org/records?|www\.kaggle\.com/datasets)/[\w\-./]+")
            .expect("valid regex")
    });
    DATASET_RE
        .find(readme)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string())
}

fn extract_readme_image(readme: &str) -> Option<String> {
    static IMG_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?:!\[[^\]]*\]\((https?://[^)\s]+\.(?:png|jpg|jpeg|gif))\)|<img[^>]+src="(https?://[^"]+\.(?:png|jpg|jpeg|gif))")"#)
            .expect("valid regex")
    });
    IMG_RE.captures(readme).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    })
}

fn classify_task_type(readme_lower: &str, description: Option<&str>) -> Option<String> {
    let mut haystack = readme_lower.to_string();
    if let Some(desc) = description {
        haystack.push(' ');
        haystack.push_str(&desc.to_lowercase());
    }

    let patterns: &[(&str, &[&str])] = &[
        (
            "Code Generation",
            &["code generation", "codegen", "program synthesis"],
        ),
        (
            "Web Automation",
            &["web automation", "browser automation", "web agent", "web navigation"],
        ),
        (
            "Tool Use",
            &["tool use", "tool calling", "function calling", "api calling"],
        ),
        ("Multi-Agent", &["multi-agent", "agent collaboration", "multi agent"]),
        (
            "Backend Performance",
            &["load testing", "requests per second", "web framework benchmark", "database benchmark"],
        ),
        (
            "Reasoning",
            &["reasoning", "chain-of-thought", "math reasoning"],
        ),
        (
            "Code Understanding",
            &["code understanding", "code comprehension", "code analysis"],
        ),
    ];

    for (task, needles) in patterns {
        if needles.iter().any(|n| haystack.contains(n)) {
            return Some(task.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repo {
        Repo {
            full_name: "org/agent-bench".into(),
            html_url: "https://github.com/org/agent-bench".into(),
            description: Some("A multi-agent benchmark".into()),
            stargazers_count: 120,
            fork: false,
            topics: vec!["agent-benchmark".into()],
            language: Some("Python".into()),
            created_at: Some((Utc::now() - chrono::Duration::days(200)).to_rfc3339()),
            pushed_at: Some((Utc::now() - chrono::Duration::days(3)).to_rfc3339()),
            license: Some(License {
                name: Some("MIT License".into()),
            }),
        }
    }

    fn collector() -> GithubCollector {
        GithubCollector::new(GithubConfig::default(), None)
    }

    #[test]
    fn fork_rejected_regardless_of_stars() {
        let mut r = repo();
        r.fork = true;
        r.stargazers_count = 50_000;
        assert!(!collector().passes_repo_gate(&r));
    }

    #[test]
    fn blacklisted_topic_rejected() {
        let mut r = repo();
        r.topics = vec!["awesome".into()];
        assert!(!collector().passes_repo_gate(&r));
    }

    #[test]
    fn fresh_repo_star_floor() {
        let mut r = repo();
        r.created_at = Some((Utc::now() - chrono::Duration::days(3)).to_rfc3339());
        r.stargazers_count = 5;
        assert!(collector().passes_repo_gate(&r));
        r.stargazers_count = 4;
        assert!(!collector().passes_repo_gate(&r));
    }

    #[test]
    fn old_repo_needs_fifty_stars() {
        let mut r = repo();
        r.created_at = Some((Utc::now() - chrono::Duration::days(400)).to_rfc3339());
        r.stargazers_count = 49;
        assert!(!collector().passes_repo_gate(&r));
        r.stargazers_count = 50;
        assert!(collector().passes_repo_gate(&r));
    }

    #[test]
    fn metric_and_baseline_extraction() {
        let readme = "We report pass@1 and accuracy against GPT-4 and Claude Sonnet baselines.";
        let lower = readme.to_lowercase();
        let metrics = extract_metrics(&lower);
        assert!(metrics.contains(&"Pass@k".to_string()));
        assert!(metrics.contains(&"Accuracy".to_string()));
        let baselines = extract_baselines(&lower);
        assert!(baselines.contains(&"GPT-4".to_string()));
        assert!(baselines.contains(&"Claude".to_string()));
    }

    #[test]
    fn readme_image_extraction() {
        let md = "# Title\n![overview](https://example.com/fig.png)\ntext";
        assert_eq!(
            extract_readme_image(md).as_deref(),
            Some("https://example.com/fig.png")
        );
        let html = r#"<img alt="x" src="https://example.com/hero.jpg" width="600">"#;
        assert_eq!(
            extract_readme_image(html).as_deref(),
            Some("https://example.com/hero.jpg")
        );
    }

    #[test]
    fn clean_readme_strips_markup() {
        let md = "## Title\n![img](https://x.com/a.png)\n<p align=\"center\">text</p>\n**bold**";
        let cleaned = clean_readme(md, 500);
        assert!(!cleaned.contains('<'));
        assert!(!cleaned.contains("!["));
        assert!(!cleaned.contains("**"));
        assert!(cleaned.contains("text"));
    }

    #[test]
    fn dataset_size_extraction() {
        let readme = "The suite contains 1,200 tasks across five domains.";
        assert_eq!(extract_dataset_size(readme).as_deref(), Some("1,200 tasks"));
    }

    #[test]
    fn task_type_classification() {
        assert_eq!(
            classify_task_type("this is a code generation benchmark", None).as_deref(),
            Some("Code Generation")
        );
        assert_eq!(classify_task_type("nothing relevant", None), None);
    }
}
