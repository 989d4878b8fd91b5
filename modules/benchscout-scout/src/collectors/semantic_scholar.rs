//! Semantic Scholar paper search collector. Disabled by default; the public
//! API rate limits aggressively without a key.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use benchscout_common::config::SemanticScholarConfig;
use benchscout_common::constants::SEMANTIC_SCHOLAR_API;
use benchscout_common::{RawCandidate, Source};

use super::{http_client, parse_datetime, Collector};

pub struct SemanticScholarCollector {
    cfg: SemanticScholarConfig,
    http: reqwest::Client,
}

impl SemanticScholarCollector {
    pub fn new(cfg: SemanticScholarConfig) -> Self {
        let http = http_client(cfg.timeout_seconds);
        Self { cfg, http }
    }

    fn to_candidate(paper: &Value) -> Option<RawCandidate> {
        let title = paper["title"].as_str()?.to_string();
        let url = paper["url"].as_str()?.to_string();

        let mut candidate = RawCandidate::new(title, url.clone(), Source::SemanticScholar);
        candidate.abstract_text = paper["abstract"].as_str().map(str::to_string);
        candidate.publish_date = paper["publicationDate"].as_str().and_then(parse_datetime);
        candidate.authors = paper["authors"]
            .as_array()
            .map(|authors| {
                authors
                    .iter()
                    .filter_map(|a| a["name"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        candidate.paper_url = Some(url);
        if let Some(arxiv_id) = paper["externalIds"]["ArXiv"].as_str() {
            candidate
                .raw_metadata
                .insert("arxiv_id".into(), arxiv_id.to_string());
        }
        Some(candidate)
    }
}

#[async_trait]
impl Collector for SemanticScholarCollector {
    fn name(&self) -> &'static str {
        "semantic_scholar"
    }

    fn source(&self) -> Source {
        Source::SemanticScholar
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let mut candidates = Vec::new();
        let mut seen_urls = std::collections::HashSet::new();
        let limit = self
            .cfg
            .max_results
            .min(100)
            .to_string();

        for keyword in &self.cfg.keywords {
            let result = async {
                let resp = self
                    .http
                    .get(SEMANTIC_SCHOLAR_API)
                    .query(&[
                        ("query", keyword.as_str()),
                        (
                            "fields",
                            "title,abstract,url,publicationDate,authors,externalIds",
                        ),
                        ("limit", limit.as_str()),
                    ])
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(anyhow!("paper search HTTP {status}"));
                }
                Ok::<_, anyhow::Error>(resp.json::<Value>().await?)
            }
            .await;

            match result {
                Ok(data) => {
                    for paper in data["data"].as_array().unwrap_or(&Vec::new()) {
                        if let Some(candidate) = Self::to_candidate(paper) {
                            if seen_urls.insert(candidate.url.clone()) {
                                candidates.push(candidate);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(keyword = %keyword, error = %e, "paper search failed, partial results kept");
                }
            }
        }

        info!(count = candidates.len(), "semantic scholar collection complete");
        Ok(candidates)
    }
}
