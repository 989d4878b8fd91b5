//! DB-Engines ranking collector. Trusted source.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use scraper::{Html, Selector};
use tracing::{info, warn};

use benchscout_common::config::DbenginesConfig;
use benchscout_common::{RawCandidate, Source};

use super::{http_client, Collector};

pub struct DbenginesCollector {
    cfg: DbenginesConfig,
    http: reqwest::Client,
}

impl DbenginesCollector {
    pub fn new(cfg: DbenginesConfig) -> Self {
        let http = http_client(cfg.timeout_seconds);
        Self { cfg, http }
    }

    fn base(&self) -> String {
        self.cfg.base_url.trim_end_matches('/').to_string()
    }

    fn parse_ranking(&self, html: &str) -> Vec<RawCandidate> {
        let document = Html::parse_document(html);
        let table_selector = Selector::parse("table.dbi").expect("valid selector");
        let row_selector = Selector::parse("tr").expect("valid selector");
        let rank_selector = Selector::parse("td").expect("valid selector");
        let name_selector = Selector::parse("th.pad-l a").expect("valid selector");
        let type_selector = Selector::parse("th.pad-r").expect("valid selector");
        let score_selector = Selector::parse("td.pad-l").expect("valid selector");

        let Some(table) = document.select(&table_selector).next() else {
            warn!("ranking table not found, page layout changed");
            return Vec::new();
        };

        // The ranking is refreshed monthly; stamp rows with the first of the
        // current month.
        let now = Utc::now();
        let publish_date = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single();

        let mut candidates = Vec::new();
        for row in table.select(&row_selector) {
            if candidates.len() >= self.cfg.max_results {
                break;
            }
            let Some(name_el) = row.select(&name_selector).next() else {
                continue;
            };
            let Some(rank_el) = row.select(&rank_selector).next() else {
                continue;
            };

            let db_name = name_el.text().collect::<String>().trim().to_string();
            if db_name.is_empty() {
                continue;
            }
            let rank = rank_el.text().collect::<String>().trim().to_string();
            let db_type = row
                .select(&type_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let score = row
                .select(&score_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            let detail_url = name_el
                .value()
                .attr("href")
                .map(|href| self.absolute_url(href))
                .unwrap_or_else(|| format!("{}/ranking", self.base()));

            let mut candidate = RawCandidate::new(
                format!("DB-Engines - {db_name} Benchmark"),
                detail_url.clone(),
                Source::Dbengines,
            );
            candidate.abstract_text = Some(format!(
                "{db_name}, ranked #{rank} {db_type} database on the DB-Engines popularity \
                 ranking with a score of {score}. The detail page carries performance \
                 comparisons, technical documentation, and usage data."
            ));
            candidate.publish_date = publish_date;
            candidate.raw_metadata.insert("database".into(), db_name);
            candidate.raw_metadata.insert("type".into(), db_type);
            candidate.raw_metadata.insert("rank".into(), rank);
            candidate.raw_metadata.insert("ranking_score".into(), score);
            candidates.push(candidate);
        }

        candidates
    }

    fn absolute_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Some(stripped) = href.strip_prefix('/') {
            // Site-absolute paths resolve against the host root.
            let base = self.base();
            let host = base
                .split('/')
                .take(3)
                .collect::<Vec<_>>()
                .join("/");
            format!("{host}/{stripped}")
        } else {
            format!("{}/{href}", self.base())
        }
    }
}

#[async_trait]
impl Collector for DbenginesCollector {
    fn name(&self) -> &'static str {
        "dbengines"
    }

    fn source(&self) -> Source {
        Source::Dbengines
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>> {
        let url = format!("{}/ranking", self.base());
        let html = match async {
            let resp = self.http.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("ranking HTTP {status}"));
            }
            Ok::<_, anyhow::Error>(resp.text().await?)
        }
        .await
        {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "ranking fetch failed, returning empty");
                return Ok(Vec::new());
            }
        };

        let candidates = self.parse_ranking(&html);
        info!(count = candidates.len(), "dbengines collection complete");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANKING_HTML: &str = r#"
        <table class="dbi">
          <tr><th>header row</th></tr>
          <tr>
            <td>1.</td><td>1.</td><td>1.</td>
            <th class="pad-l"><a href="/system/Oracle">Oracle</a></th>
            <th class="pad-r">Relational</th>
            <td class="pad-l">1240.11</td>
          </tr>
          <tr>
            <td>2.</td><td>2.</td><td>2.</td>
            <th class="pad-l"><a href="/system/MySQL">MySQL</a></th>
            <th class="pad-r">Relational</th>
            <td class="pad-l">1001.52</td>
          </tr>
        </table>
    "#;

    fn collector() -> DbenginesCollector {
        DbenginesCollector::new(DbenginesConfig::default())
    }

    #[test]
    fn ranking_rows_become_candidates() {
        let candidates = collector().parse_ranking(RANKING_HTML);
        assert_eq!(candidates.len(), 2);
        let c = &candidates[0];
        assert_eq!(c.title, "DB-Engines - Oracle Benchmark");
        assert_eq!(c.source, Source::Dbengines);
        assert_eq!(c.url, "https://db-engines.com/system/Oracle");
        assert_eq!(c.raw_metadata.get("rank").unwrap(), "1.");
        assert_eq!(c.raw_metadata.get("ranking_score").unwrap(), "1240.11");
        // Publish date is pinned to the first of the month.
        assert_eq!(c.publish_date.unwrap().day(), 1);
    }

    #[test]
    fn missing_table_yields_empty() {
        assert!(collector().parse_ranking("<html><body>moved</body></html>").is_empty());
    }

    #[test]
    fn max_results_caps_output() {
        let cfg = DbenginesConfig {
            max_results: 1,
            ..DbenginesConfig::default()
        };
        let collector = DbenginesCollector::new(cfg);
        assert_eq!(collector.parse_ranking(RANKING_HTML).len(), 1);
    }
}
