//! HuggingFace hub dataset collector.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use benchscout_common::config::HuggingfaceConfig;
use benchscout_common::constants::{HUGGINGFACE_DATASETS_API, HUGGINGFACE_MAX_RETRIES};
use benchscout_common::{RawCandidate, Source};

use super::{http_client, parse_datetime, Collector};

pub struct HuggingfaceCollector {
    cfg: HuggingfaceConfig,
    token: Option<String>,
    http: reqwest::Client,
    api_url: String,
}

impl HuggingfaceCollector {
    pub fn new(cfg: HuggingfaceConfig, token: Option<String>) -> Self {
        let http = http_client(cfg.timeout_seconds);
        Self {
            cfg,
            token,
            http,
            api_url: HUGGINGFACE_DATASETS_API.to_string(),
        }
    }

    async fn fetch_keyword(&self, keyword: &str) -> Result<Vec<Value>> {
        let mut last_error = None;
        for attempt in 1..=HUGGINGFACE_MAX_RETRIES {
            let limit = self.cfg.max_results.to_string();
            let result = async {
                let mut builder = self.http.get(&self.api_url).query(&[
                    ("search", keyword),
                    ("sort", "lastModified"),
                    ("direction", "-1"),
                    ("limit", limit.as_str()),
                    ("expand[]", "downloads"),
                    ("expand[]", "tags"),
                    ("expand[]", "lastModified"),
                    ("expand[]", "cardData"),
                    ("expand[]", "description"),
                ]);
                if let Some(ref token) = self.token {
                    builder = builder.bearer_auth(token);
                }
                let resp = builder.send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(anyhow!("hub search HTTP {status}"));
                }
                Ok(resp.json::<Value>().await?)
            }
            .await;

            match result {
                Ok(Value::Array(items)) => return Ok(items),
                Ok(_) => return Ok(Vec::new()),
                Err(e) => {
                    warn!(keyword, attempt, error = %e, "hub search failed");
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("hub search failed")))
    }

    fn to_candidate(&self, dataset: &Value) -> Option<RawCandidate> {
        let id = dataset
            .get("id")
            .or_else(|| dataset.get("_id"))
            .and_then(Value::as_str)?;

        let downloads = dataset
            .get("downloads")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if downloads < self.cfg.min_downloads {
            return None;
        }

        let card = dataset.get("cardData").cloned().unwrap_or(Value::Null);
        let summary = card
            .get("summary")
            .or_else(|| card.get("description"))
            .and_then(Value::as_str)
            .or_else(|| dataset.get("description").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();

        let tags: Vec<String> = dataset
            .get("tags")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Keyword relevance across summary, tags, and the dataset id.
        let haystack = format!(
            "{} {} {}",
            summary.to_lowercase(),
            tags.join(" ").to_lowercase(),
            id.to_lowercase()
        );
        if !self
            .cfg
            .keywords
            .iter()
            .any(|kw| haystack.contains(&kw.to_lowercase()))
        {
            return None;
        }

        let publish_date = dataset
            .get("lastModified")
            .and_then(Value::as_str)
            .and_then(parse_datetime);

        // Entries older than the lookback window are dropped after retrieval.
        let cutoff = Utc::now() - chrono::Duration::days(self.cfg.lookback_days);
        if let Some(date) = publish_date {
            if date < cutoff {
                return None;
            }
        }

        let task_type = tags
            .iter()
            .find(|t| t.starts_with("task_categories:"))
            .map(|t| t.trim_start_matches("task_categories:").to_string());

        let url = format!("https://huggingface.co/datasets/{id}");
        let title = card
            .get("pretty_name")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();

        let mut candidate = RawCandidate::new(title, url.clone(), Source::Huggingface);
        candidate.abstract_text = (!summary.is_empty()).then_some(summary);
        candidate.publish_date = publish_date;
        candidate.dataset_url = Some(url);
        candidate.task_type = task_type;
        candidate
            .raw_metadata
            .insert("downloads".into(), downloads.to_string());
        if !tags.is_empty() {
            candidate.raw_metadata.insert("tags".into(), tags.join(","));
        }
        Some(candidate)
    }
}

#[async_trait]
impl Collector for HuggingfaceCollector {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    fn source(&self) -> Source {
        Source::Huggingface
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        let mut failed_keywords = 0;

        for keyword in &self.cfg.keywords {
            match self.fetch_keyword(keyword).await {
                Ok(datasets) => {
                    for dataset in &datasets {
                        let id = dataset
                            .get("id")
                            .or_else(|| dataset.get("_id"))
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string();
                        if id.is_empty() || !seen_ids.insert(id) {
                            continue;
                        }
                        if let Some(candidate) = self.to_candidate(dataset) {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(e) => {
                    failed_keywords += 1;
                    warn!(keyword = %keyword, error = %e, "hub keyword failed, partial results kept");
                }
            }
        }

        info!(
            count = candidates.len(),
            failed_keywords, "huggingface collection complete"
        );
        Ok(candidates)
    }
}
