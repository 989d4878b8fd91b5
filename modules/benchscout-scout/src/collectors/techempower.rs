//! TechEmpower framework benchmarks collector. Scrapes the status index for
//! recent runs, then reads run metadata and the raw results payload; each
//! framework clearing the composite-score floor becomes one candidate.
//! Trusted source.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{info, warn};

use benchscout_common::config::TechempowerConfig;
use benchscout_common::constants::{TECHEMPOWER_RUNS_LIMIT, TECHEMPOWER_SCORE_SCALE};
use benchscout_common::{RawCandidate, Source};

use super::{http_client, Collector};

const TEST_TYPES: &[&str] = &[
    "json",
    "db",
    "query",
    "cached-query",
    "fortune",
    "update",
    "plaintext",
];

pub struct TechempowerCollector {
    cfg: TechempowerConfig,
    http: reqwest::Client,
}

#[derive(Debug, Clone)]
struct RunRef {
    uuid: String,
    environment: String,
}

impl TechempowerCollector {
    pub fn new(cfg: TechempowerConfig) -> Self {
        let http = http_client(cfg.timeout_seconds);
        Self { cfg, http }
    }

    fn base(&self) -> String {
        self.cfg.base_url.trim_end_matches('/').to_string()
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} -> HTTP {status}"));
        }
        Ok(resp.text().await?)
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} -> HTTP {status}"));
        }
        Ok(resp.json().await?)
    }

    fn parse_runs(html: &str) -> Vec<RunRef> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse("table.resultsTable tbody tr").expect("valid selector");
        let cell_selector = Selector::parse("td").expect("valid selector");

        document
            .select(&row_selector)
            .take(TECHEMPOWER_RUNS_LIMIT)
            .filter_map(|row| {
                let uuid = row.value().attr("data-uuid")?.to_string();
                let environment = row
                    .select(&cell_selector)
                    .next()
                    .map(|cell| cell.text().collect::<Vec<_>>().join(" ").trim().to_string())
                    .unwrap_or_default();
                Some(RunRef { uuid, environment })
            })
            .collect()
    }

    /// Peak requests/second per test type for one framework.
    fn extract_metrics(framework: &str, raw_data: &Value, duration: f64) -> Vec<(String, f64)> {
        let mut metrics = Vec::new();
        for test_type in TEST_TYPES {
            let Some(records) = raw_data[*test_type][framework].as_array() else {
                continue;
            };
            let best_rps = records
                .iter()
                .filter_map(|r| r["totalRequests"].as_f64())
                .map(|total| total / duration)
                .fold(0.0_f64, f64::max);
            if best_rps > 0.0 {
                metrics.push((test_type.to_string(), best_rps));
            }
        }
        metrics
    }

    fn build_candidates(&self, run: &RunRef, run_meta: &Value, payload: &Value) -> Vec<RawCandidate> {
        let frameworks: Vec<&str> = payload["frameworks"]
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let raw_data = &payload["rawData"];
        let duration = payload["duration"].as_f64().unwrap_or(1.0).max(1.0);

        let meta_map: std::collections::HashMap<&str, &Value> = payload["testMetadata"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        entry["framework"]
                            .as_str()
                            .or_else(|| entry["project_name"].as_str())
                            .map(|name| (name, entry))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let publish_date = run_meta["startTime"].as_str().and_then(parse_run_datetime);

        let mut candidates = Vec::new();
        for framework in frameworks {
            let metrics = Self::extract_metrics(framework, raw_data, duration);
            if metrics.is_empty() {
                continue;
            }
            let avg_rps: f64 =
                metrics.iter().map(|(_, rps)| rps).sum::<f64>() / metrics.len() as f64;
            let composite = avg_rps / TECHEMPOWER_SCORE_SCALE;
            if composite < self.cfg.min_composite_score {
                continue;
            }

            let meta = meta_map.get(framework).copied().unwrap_or(&Value::Null);
            let display_name = meta["display_name"].as_str().unwrap_or(framework);
            let language = meta["language"].as_str().unwrap_or("unknown");
            let classification = meta["classification"].as_str().unwrap_or("");

            let mut lines = vec![
                format!("{framework} - {language} / {classification}"),
                format!("Composite score: {composite:.2}"),
                "Peak throughput (k req/s):".to_string(),
            ];
            for (test_type, rps) in &metrics {
                lines.push(format!("- {test_type}: {:.1}k", rps / 1000.0));
            }

            let mut candidate = RawCandidate::new(
                format!("TechEmpower Benchmark - {display_name}"),
                format!("{}/results/{}", self.base(), run.uuid),
                Source::Techempower,
            );
            candidate.abstract_text = Some(lines.join("\n"));
            candidate.publish_date = publish_date;
            candidate
                .raw_metadata
                .insert("framework".into(), framework.to_string());
            candidate
                .raw_metadata
                .insert("language".into(), language.to_string());
            candidate
                .raw_metadata
                .insert("composite_score".into(), format!("{composite:.2}"));
            candidate
                .raw_metadata
                .insert("environment".into(), run.environment.clone());
            for (test_type, rps) in &metrics {
                candidate
                    .raw_metadata
                    .insert(format!("{test_type}_rps"), format!("{rps:.0}"));
            }
            candidates.push(candidate);
        }

        candidates.sort_by(|a, b| {
            let score = |c: &RawCandidate| {
                c.raw_metadata
                    .get("composite_score")
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0)
            };
            score(b).partial_cmp(&score(a)).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }
}

#[async_trait]
impl Collector for TechempowerCollector {
    fn name(&self) -> &'static str {
        "techempower"
    }

    fn source(&self) -> Source {
        Source::Techempower
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let index = match self.fetch_text(&self.base()).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "status index unavailable, returning empty");
                return Ok(Vec::new());
            }
        };

        let runs = Self::parse_runs(&index);
        if runs.is_empty() {
            warn!("no runs found on status index");
            return Ok(Vec::new());
        }

        for run in &runs {
            let run_meta = match self
                .fetch_json(&format!("{}/results/{}.json", self.base(), run.uuid))
                .await
            {
                Ok(data) => data["result"].clone(),
                Err(e) => {
                    warn!(uuid = %run.uuid, error = %e, "run metadata fetch failed");
                    continue;
                }
            };
            if run_meta.is_null() {
                continue;
            }

            let Some(raw_file) = run_meta["json"]["fileName"].as_str() else {
                warn!(uuid = %run.uuid, "run has no raw results file");
                continue;
            };
            let payload = match self
                .fetch_json(&format!("{}/raw/{raw_file}", self.base()))
                .await
            {
                Ok(data) => data,
                Err(e) => {
                    warn!(uuid = %run.uuid, error = %e, "raw payload fetch failed");
                    continue;
                }
            };

            let candidates = self.build_candidates(run, &run_meta, &payload);
            if !candidates.is_empty() {
                info!(
                    uuid = %run.uuid,
                    count = candidates.len(),
                    "techempower collection complete"
                );
                return Ok(candidates);
            }
        }

        info!("techempower collection found no qualifying frameworks");
        Ok(Vec::new())
    }
}

fn parse_run_datetime(value: &str) -> Option<DateTime<Utc>> {
    let text = value.replace(" at ", " ");
    for fmt in ["%Y-%m-%d %I:%M %p", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&text, fmt) {
            return Some(dt.and_utc());
        }
    }
    super::parse_datetime(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_runs_from_index_html() {
        let html = r#"
            <table class="resultsTable"><tbody>
              <tr data-uuid="abc-123"><td>Citrine</td><td>ok</td><td>2026-07-01</td></tr>
              <tr data-uuid="def-456"><td>Azure</td><td>ok</td><td>2026-06-20</td></tr>
              <tr><td>No uuid row</td></tr>
            </tbody></table>
        "#;
        let runs = TechempowerCollector::parse_runs(html);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].uuid, "abc-123");
        assert_eq!(runs[0].environment, "Citrine");
    }

    #[test]
    fn composite_floor_filters_frameworks() {
        let collector = TechempowerCollector::new(TechempowerConfig::default());
        let run = RunRef {
            uuid: "abc".into(),
            environment: "Citrine".into(),
        };
        let run_meta = json!({"startTime": "2026-07-01 10:00 AM"});
        // fast: 60M requests over 10s = 6M rps, composite 60.
        // slow: 100k requests over 10s = 10k rps, composite 0.1.
        let payload = json!({
            "frameworks": ["fast", "slow"],
            "duration": 10,
            "rawData": {
                "json": {
                    "fast": [{"totalRequests": 60_000_000.0}],
                    "slow": [{"totalRequests": 100_000.0}]
                }
            },
            "testMetadata": [
                {"framework": "fast", "display_name": "FastFrame", "language": "rust", "classification": "micro"}
            ]
        });

        let candidates = collector.build_candidates(&run, &run_meta, &payload);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.title, "TechEmpower Benchmark - FastFrame");
        assert_eq!(c.source, Source::Techempower);
        assert_eq!(c.raw_metadata.get("composite_score").unwrap(), "60.00");
        assert!(c.abstract_text.as_deref().unwrap().contains("rust"));
    }

    #[test]
    fn run_datetime_parsing() {
        let dt = parse_run_datetime("2026-07-01 at 10:30 AM").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2026-07-01 10:30");
    }
}
