//! Source adapters. Each collector maps one upstream API's schema into
//! `RawCandidate` and nothing else: no prefilter, scorer, or storage calls.
//! A collector that exhausts its retries returns an empty list; partial
//! results (some keywords failed, others succeeded) are returned as-is.

pub mod arxiv;
pub mod dbengines;
pub mod github;
pub mod helm;
pub mod huggingface;
pub mod semantic_scholar;
pub mod techempower;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use benchscout_common::{RawCandidate, Source};

pub use arxiv::ArxivCollector;
pub use dbengines::DbenginesCollector;
pub use github::GithubCollector;
pub use helm::HelmCollector;
pub use huggingface::HuggingfaceCollector;
pub use semantic_scholar::SemanticScholarCollector;
pub use techempower::TechempowerCollector;

#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;
    fn source(&self) -> Source;
    fn enabled(&self) -> bool;
    async fn collect(&self) -> Result<Vec<RawCandidate>>;
}

/// HTTP client with a per-collector timeout and the shared user agent.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("benchscout/0.4")
        .build()
        .unwrap_or_default()
}

/// Parse RFC 3339 / ISO 8601 timestamps, tolerating a trailing `Z`.
pub(crate) fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            // Date-only form, midnight UTC.
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}
