//! HELM leaderboard collector: one candidate per scenario group that passes
//! the whitelist-minus-blacklist filter. A curated upstream, so marked
//! trusted downstream.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use benchscout_common::config::HelmConfig;
use benchscout_common::{RawCandidate, Source};

use super::{http_client, parse_datetime, Collector};

pub struct HelmCollector {
    cfg: HelmConfig,
    http: reqwest::Client,
}

impl HelmCollector {
    pub fn new(cfg: HelmConfig) -> Self {
        let http = http_client(cfg.timeout_seconds);
        Self { cfg, http }
    }

    /// Current release parsed out of the index config.js; falls back to the
    /// configured default when the page changes shape.
    async fn fetch_release(&self) -> String {
        static RELEASE_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"window\.RELEASE\s*=\s*"([^"]+)""#).expect("valid regex"));

        let url = format!("{}config.js", ensure_trailing_slash(&self.cfg.base_url));
        let result = async {
            let resp = self.http.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("config.js HTTP {status}"));
            }
            Ok::<_, anyhow::Error>(resp.text().await?)
        }
        .await;

        match result {
            Ok(text) => RELEASE_RE
                .captures(&text)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| self.cfg.default_release.clone()),
            Err(e) => {
                warn!(error = %e, "release discovery failed, using default");
                self.cfg.default_release.clone()
            }
        }
    }

    async fn fetch_json(&self, release: &str, file: &str) -> Result<Value> {
        let url = format!(
            "{}/releases/{release}/{file}",
            self.cfg.storage_base.trim_end_matches('/')
        );
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("{file} HTTP {status}"));
        }
        Ok(resp.json().await?)
    }

    fn is_relevant_scenario(&self, name: &str, description: &str) -> bool {
        let text = format!("{} {}", name.to_lowercase(), description.to_lowercase());
        if self
            .cfg
            .excluded_scenarios
            .iter()
            .any(|kw| text.contains(kw.as_str()))
        {
            debug!(name, "scenario hit blacklist");
            return false;
        }
        self.cfg
            .allowed_scenarios
            .iter()
            .any(|kw| text.contains(kw.as_str()))
    }

    fn parse_groups(
        &self,
        sections: &[Value],
        release: &str,
        publish_date: Option<DateTime<Utc>>,
    ) -> Vec<RawCandidate> {
        let mut candidates = Vec::new();
        let mut seen_slugs = std::collections::HashSet::new();

        for section in sections {
            let section_title = section["title"].as_str().unwrap_or("");
            if section_title.trim().eq_ignore_ascii_case("all scenarios") {
                continue;
            }

            let headers: Vec<&str> = section["header"]
                .as_array()
                .map(|h| h.iter().filter_map(|c| c["value"].as_str()).collect())
                .unwrap_or_default();

            let Some(rows) = section["rows"].as_array() else {
                continue;
            };
            for row in rows {
                let Some(cells) = row.as_array() else { continue };
                let Some(first) = cells.first() else { continue };
                let Some(group_name) = first["value"].as_str() else {
                    continue;
                };

                let slug = first["href"]
                    .as_str()
                    .and_then(|href| href.split("group=").nth(1))
                    .map(str::to_string)
                    .unwrap_or_else(|| slugify(group_name));
                if !seen_slugs.insert(slug.clone()) {
                    continue;
                }

                let row_map: std::collections::HashMap<&str, &Value> = headers
                    .iter()
                    .zip(cells.iter())
                    .map(|(h, c)| (*h, c))
                    .collect();

                let description = row_map
                    .get("Description")
                    .and_then(|v| v["value"].as_str())
                    .unwrap_or("");
                if !self.is_relevant_scenario(group_name, description) {
                    continue;
                }

                let mut abstract_parts = Vec::new();
                if !description.is_empty() {
                    abstract_parts.push(truncate_chars(description.trim(), 200));
                }
                if let Some(adaptation) = row_map
                    .get("Adaptation method")
                    .and_then(|v| v["value"].as_str())
                    .filter(|s| !s.is_empty())
                {
                    abstract_parts.push(format!("Adaptation: {adaptation}"));
                }
                if let Some(models) = row_map.get("# models").and_then(|v| v["value"].as_i64()) {
                    abstract_parts.push(format!("Models covered: {models}"));
                }

                let url = format!(
                    "{}?group={slug}",
                    ensure_trailing_slash(&self.cfg.base_url)
                );
                let mut candidate = RawCandidate::new(
                    format!("HELM - {group_name}"),
                    url.clone(),
                    Source::Helm,
                );
                candidate.abstract_text =
                    (!abstract_parts.is_empty()).then(|| abstract_parts.join(" | "));
                candidate.publish_date = publish_date;
                candidate.dataset_url = Some(url);
                candidate
                    .raw_metadata
                    .insert("release".into(), release.to_string());
                candidate
                    .raw_metadata
                    .insert("section".into(), section_title.to_string());
                candidate.raw_metadata.insert("group_slug".into(), slug);
                if let Some(instances) =
                    row_map.get("# instances").and_then(|v| v["value"].as_i64())
                {
                    candidate
                        .raw_metadata
                        .insert("instances".into(), instances.to_string());
                }

                candidates.push(candidate);
            }
        }

        candidates
    }
}

#[async_trait]
impl Collector for HelmCollector {
    fn name(&self) -> &'static str {
        "helm"
    }

    fn source(&self) -> Source {
        Source::Helm
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let release = self.fetch_release().await;

        let publish_date = match self.fetch_json(&release, "summary.json").await {
            Ok(summary) => summary["date"].as_str().and_then(parse_datetime),
            Err(e) => {
                warn!(release = %release, error = %e, "summary fetch failed");
                None
            }
        };

        let groups = match self.fetch_json(&release, "groups.json").await {
            Ok(Value::Array(sections)) => sections,
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(release = %release, error = %e, "groups fetch failed, returning empty");
                return Ok(Vec::new());
            }
        };

        let candidates = self.parse_groups(&groups, &release, publish_date);
        info!(release = %release, count = candidates.len(), "helm collection complete");
        Ok(candidates)
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    let mut out = url.trim_end_matches('/').to_string();
    out.push('/');
    out
}

fn slugify(name: &str) -> String {
    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
    NON_ALNUM
        .replace_all(&name.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sections() -> Vec<Value> {
        vec![json!({
            "title": "Scenarios",
            "header": [
                {"value": "Group"},
                {"value": "Description"},
                {"value": "Adaptation method"},
                {"value": "# models"},
                {"value": "# instances"}
            ],
            "rows": [
                [
                    {"value": "Code generation", "href": "?group=code_generation"},
                    {"value": "Synthesize programs from docstrings"},
                    {"value": "generation"},
                    {"value": 30},
                    {"value": 164}
                ],
                [
                    {"value": "Summarization", "href": "?group=summarization"},
                    {"value": "Summarize news articles"},
                    {"value": "generation"},
                    {"value": 28},
                    {"value": 1000}
                ]
            ]
        })]
    }

    fn collector() -> HelmCollector {
        HelmCollector::new(HelmConfig::default())
    }

    #[test]
    fn scenario_filter_keeps_allowed_drops_excluded() {
        let candidates = collector().parse_groups(&sections(), "v0.4.0", None);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.title, "HELM - Code generation");
        assert_eq!(c.source, Source::Helm);
        assert!(c.url.contains("group=code_generation"));
        assert_eq!(c.raw_metadata.get("instances").unwrap(), "164");
    }

    #[test]
    fn all_scenarios_section_skipped() {
        let mut all = sections();
        all.push(json!({
            "title": "All scenarios",
            "header": [{"value": "Group"}],
            "rows": [[{"value": "Code generation dupe", "href": "?group=code_dupe"}]]
        }));
        let candidates = collector().parse_groups(&all, "v0.4.0", None);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn duplicate_slugs_deduplicated() {
        let mut doubled = sections();
        doubled.extend(sections());
        let candidates = collector().parse_groups(&doubled, "v0.4.0", None);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Code Generation (v2)"), "code_generation_v2");
    }
}
