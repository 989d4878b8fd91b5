//! arXiv Atom API collector.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use benchscout_common::config::ArxivConfig;
use benchscout_common::constants::ARXIV_API_URL;
use benchscout_common::{arxiv_id_from_url, RawCandidate, Source};

use super::{http_client, parse_datetime, Collector};

pub struct ArxivCollector {
    cfg: ArxivConfig,
    http: reqwest::Client,
    api_url: String,
}

impl ArxivCollector {
    pub fn new(cfg: ArxivConfig) -> Self {
        let http = http_client(cfg.timeout_seconds);
        Self {
            cfg,
            http,
            api_url: ARXIV_API_URL.to_string(),
        }
    }

    /// OR-joined quoted keywords AND OR-joined category filters.
    fn search_query(&self) -> String {
        let keywords = self
            .cfg
            .keywords
            .iter()
            .map(|kw| format!("all:\"{}\"", kw.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR ");
        let categories = self
            .cfg
            .categories
            .iter()
            .map(|c| format!("cat:{c}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        if categories.is_empty() {
            format!("({keywords})")
        } else {
            format!("({keywords}) AND ({categories})")
        }
    }

    async fn fetch_feed(&self) -> Result<String> {
        let query = [
            ("search_query".to_string(), self.search_query()),
            ("start".to_string(), "0".to_string()),
            ("max_results".to_string(), self.cfg.max_results.to_string()),
            ("sortBy".to_string(), "submittedDate".to_string()),
            ("sortOrder".to_string(), "descending".to_string()),
        ];
        let resp = self.http.get(&self.api_url).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("arxiv query failed: HTTP {status}"));
        }
        Ok(resp.text().await?)
    }

    fn to_candidates(&self, entries: Vec<FeedEntry>) -> Vec<RawCandidate> {
        let cutoff = Utc::now() - chrono::Duration::hours(self.cfg.lookback_hours);
        let mut candidates = Vec::new();

        for entry in entries {
            let published = entry.published.as_deref().and_then(parse_datetime);
            if let Some(date) = published {
                if date < cutoff {
                    continue;
                }
            }

            let abs_url = entry.id_url.replace("http://", "https://");
            let arxiv_id = arxiv_id_from_url(&abs_url).unwrap_or_default();

            let mut candidate =
                RawCandidate::new(normalize_ws(&entry.title), abs_url.clone(), Source::Arxiv);
            candidate.abstract_text = Some(normalize_ws(&entry.summary));
            candidate.authors = entry.authors;
            candidate.publish_date = published;
            candidate.paper_url = Some(abs_url);
            candidate.dataset_url = extract_dataset_url(&entry.summary);
            if !arxiv_id.is_empty() {
                candidate
                    .raw_metadata
                    .insert("arxiv_id".into(), arxiv_id.clone());
            }
            if let Some(pdf) = entry.pdf_url {
                candidate.raw_metadata.insert("pdf_url".into(), pdf);
            }
            if !entry.categories.is_empty() {
                candidate
                    .raw_metadata
                    .insert("categories".into(), entry.categories.join(","));
            }
            candidates.push(candidate);
        }

        candidates
    }
}

#[async_trait]
impl Collector for ArxivCollector {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn source(&self) -> Source {
        Source::Arxiv
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let mut last_error = None;
        for attempt in 1..=self.cfg.max_retries.max(1) {
            match self.fetch_feed().await {
                Ok(body) => {
                    let entries = parse_atom(&body);
                    let candidates = self.to_candidates(entries);
                    info!(count = candidates.len(), "arxiv collection complete");
                    return Ok(candidates);
                }
                Err(e) => {
                    warn!(attempt, max = self.cfg.max_retries, error = %e, "arxiv query failed");
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
            }
        }
        warn!("arxiv collection exhausted retries, returning empty");
        if let Some(e) = last_error {
            tracing::error!(error = %e, "arxiv final failure");
        }
        Ok(Vec::new())
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dataset link heuristics over abstract text.
fn extract_dataset_url(text: &str) -> Option<String> {
    use once_cell::sync::Lazy;
    use regex::Regex;
    static DATASET_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"https?://(?:huggingface\.co/datasets|zenodo\.org/records?|www\.kaggle\.com/datasets)/[\w\-./]+")
            .expect("valid regex")
    });
    DATASET_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
}

// ---------------------------------------------------------------------------
// Atom parsing
// ---------------------------------------------------------------------------

#[derive(Default, Debug)]
struct FeedEntry {
    id_url: String,
    title: String,
    summary: String,
    published: Option<String>,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_url: Option<String>,
}

/// Pull the fields we care about out of the Atom feed. Namespaced tags make
/// regex parsing brittle, so this walks quick-xml events instead.
fn parse_atom(body: &str) -> Vec<FeedEntry> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut entries: Vec<FeedEntry> = Vec::new();
    let mut cur = FeedEntry::default();
    let mut in_entry = false;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                text.clear();
                if name.ends_with("entry") {
                    cur = FeedEntry::default();
                    in_entry = true;
                } else if in_entry && name.ends_with("author") {
                    in_author = true;
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if !in_entry {
                    continue;
                }
                if name.ends_with("category") {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"term" {
                            if let Ok(term) = attr.unescape_value() {
                                if !term.trim().is_empty() {
                                    cur.categories.push(term.to_string());
                                }
                            }
                        }
                    }
                } else if name.ends_with("link") {
                    let mut ty = None;
                    let mut href = None;
                    for attr in e.attributes().flatten() {
                        let value = attr.unescape_value().map(|v| v.to_string()).ok();
                        match attr.key.as_ref() {
                            b"type" => ty = value,
                            b"href" => href = value,
                            _ => {}
                        }
                    }
                    if ty.as_deref() == Some("application/pdf") {
                        cur.pdf_url = href;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Ok(chunk) = t.unescape() {
                    text.push_str(&chunk);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if in_entry {
                    let value = text.trim().to_string();
                    if name.ends_with("id") {
                        cur.id_url = value;
                    } else if name.ends_with("title") {
                        cur.title = value;
                    } else if name.ends_with("summary") {
                        cur.summary = value;
                    } else if name.ends_with("published") {
                        cur.published = (!value.is_empty()).then_some(value);
                    } else if in_author && name.ends_with("name") && !value.is_empty() {
                        cur.authors.push(value);
                    } else if name.ends_with("author") {
                        in_author = false;
                    } else if name.ends_with("entry") {
                        in_entry = false;
                        entries.push(std::mem::take(&mut cur));
                    }
                }
                text.clear();
            }
            Err(e) => {
                warn!(error = %e, "arxiv feed parse aborted mid-document");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    entries
}
