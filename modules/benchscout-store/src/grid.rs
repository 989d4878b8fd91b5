//! Primary storage: a collaborative grid (multi-dimensional spreadsheet)
//! reached over its open API. Owns the tenant token lifecycle, discovers the
//! table's column names at runtime, dedups against existing rows inside a
//! per-source time window, and writes in throttled batches.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use benchscout_common::constants::{
    dedup_window_days, GRID_BATCH_PACING_SECS, GRID_BATCH_SIZE, GRID_HTTP_TIMEOUT_SECS,
    GRID_TOKEN_EARLY_REFRESH_SECS, REASONING_PREVIEW_CHARS,
};
use benchscout_common::{canonicalize_url, ScoredCandidate, Source};

use crate::retry::{retry_async, RetryPolicy};

#[derive(Error, Debug)]
pub enum GridError {
    #[error("grid auth failed: {0}")]
    Auth(String),

    #[error("grid request failed: {0}")]
    Request(String),

    #[error("grid API error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("grid field mapping error: {0}")]
    Mapping(String),
}

impl From<reqwest::Error> for GridError {
    fn from(e: reqwest::Error) -> Self {
        GridError::Request(e.to_string())
    }
}

struct TokenState {
    value: String,
    expires_at: DateTime<Utc>,
}

/// A row already present in the primary store, reduced to what dedup needs.
#[derive(Debug, Clone)]
pub struct ExistingRecord {
    pub url_key: String,
    pub source: Option<Source>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of a batched save: which candidates landed, which batches failed
/// (their contents must be diverted, never dropped), and how many were
/// skipped as already present.
#[derive(Debug, Default)]
pub struct GridSaveOutcome {
    pub saved: Vec<ScoredCandidate>,
    pub failed: Vec<ScoredCandidate>,
    pub skipped_existing: Vec<String>,
}

pub struct GridStore {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    app_token: String,
    table_id: String,
    token: Mutex<Option<TokenState>>,
    field_names: Mutex<Option<HashSet<String>>>,
    retry: RetryPolicy,
}

impl GridStore {
    pub fn new(
        base_url: &str,
        app_id: &str,
        app_secret: &str,
        app_token: &str,
        table_id: &str,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(GRID_HTTP_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            app_token: app_token.to_string(),
            table_id: table_id.to_string(),
            token: Mutex::new(None),
            field_names: Mutex::new(None),
            retry: RetryPolicy::grid(),
        }
    }

    // ------------------------------------------------------------------
    // Token lifecycle
    // ------------------------------------------------------------------

    /// Fetch or reuse the tenant access token. Refresh is guarded by the
    /// mutex so concurrent callers never each fetch.
    async fn ensure_token(&self) -> Result<String, GridError> {
        let mut guard = self.token.lock().await;
        if let Some(ref state) = *guard {
            if Utc::now() < state.expires_at {
                return Ok(state.value.clone());
            }
        }

        let url = format!("{}/auth/v3/tenant_access_token/internal", self.base_url);
        let body = json!({"app_id": self.app_id, "app_secret": self.app_secret});

        let data: Value = retry_async(self.retry, "grid.token", || async {
            let resp = self.http.post(&url).json(&body).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(GridError::Request(format!("token endpoint HTTP {status}")));
            }
            Ok(resp.json::<Value>().await?)
        })
        .await?;

        let token = data
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                let code = data.get("code").and_then(Value::as_i64).unwrap_or(-1);
                let msg = data
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("no token in response");
                GridError::Auth(format!("code={code} msg={msg}"))
            })?;

        let expire_secs = data.get("expire").and_then(Value::as_i64).unwrap_or(7200);
        let lifetime = (expire_secs - GRID_TOKEN_EARLY_REFRESH_SECS).max(600);
        *guard = Some(TokenState {
            value: token.to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        });
        info!("grid access token refreshed");
        Ok(token.to_string())
    }

    async fn authed_get(&self, url: &str, query: &[(String, String)]) -> Result<Value, GridError> {
        let token = self.ensure_token().await?;
        retry_async(self.retry, "grid.get", || {
            let token = token.clone();
            async move {
                let resp = self
                    .http
                    .get(url)
                    .bearer_auth(token)
                    .query(query)
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(GridError::Request(format!("GET {url} -> HTTP {status}")));
                }
                let data: Value = resp.json().await?;
                let code = data.get("code").and_then(Value::as_i64).unwrap_or(0);
                if code != 0 {
                    let msg = data
                        .get("msg")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    return Err(GridError::Api { code, msg });
                }
                Ok(data)
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Field discovery
    // ------------------------------------------------------------------

    /// Discover and cache the table's column names. This call historically
    /// has to survive transient failures, so it always runs under the retry
    /// helper like everything else.
    async fn ensure_fields(&self) -> Result<HashSet<String>, GridError> {
        {
            let guard = self.field_names.lock().await;
            if let Some(ref names) = *guard {
                return Ok(names.clone());
            }
        }

        let url = format!(
            "{}/bitable/v1/apps/{}/tables/{}/fields",
            self.base_url, self.app_token, self.table_id
        );

        let mut names: HashSet<String> = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();

        for _ in 0..100 {
            let mut query = vec![("page_size".to_string(), "500".to_string())];
            if let Some(ref t) = page_token {
                query.push(("page_token".to_string(), t.clone()));
            }
            let data = self.authed_get(&url, &query).await?;
            let data_obj = &data["data"];
            if let Some(items) = data_obj["items"].as_array() {
                for item in items {
                    if let Some(name) = item["field_name"].as_str() {
                        names.insert(name.to_string());
                    }
                }
            }
            let has_more = data_obj["has_more"].as_bool().unwrap_or(false);
            let next = data_obj["page_token"].as_str().map(str::to_string);
            match next {
                Some(t) if has_more && !seen_tokens.contains(&t) => {
                    seen_tokens.insert(t.clone());
                    page_token = Some(t);
                }
                _ => break,
            }
        }

        if names.is_empty() {
            return Err(GridError::Mapping("field discovery returned no columns".into()));
        }

        debug!(count = names.len(), "grid field names cached");
        let mut guard = self.field_names.lock().await;
        *guard = Some(names.clone());
        Ok(names)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    async fn paginated_records(&self) -> Result<Vec<Value>, GridError> {
        let url = format!(
            "{}/bitable/v1/apps/{}/tables/{}/records",
            self.base_url, self.app_token, self.table_id
        );

        let mut items: Vec<Value> = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..20 {
            let mut query = vec![("page_size".to_string(), "500".to_string())];
            if let Some(ref t) = page_token {
                query.push(("page_token".to_string(), t.clone()));
            }
            let data = self.authed_get(&url, &query).await?;
            let data_obj = &data["data"];
            if let Some(batch) = data_obj["items"].as_array() {
                items.extend(batch.iter().cloned());
            }
            if !data_obj["has_more"].as_bool().unwrap_or(false) {
                break;
            }
            match data_obj["page_token"].as_str() {
                Some(t) => page_token = Some(t.to_string()),
                None => break,
            }
        }

        Ok(items)
    }

    /// Read existing rows reduced to (canonical URL, source, creation time).
    pub async fn existing_records(&self) -> Result<Vec<ExistingRecord>, GridError> {
        self.ensure_fields().await?;
        let items = self.paginated_records().await?;

        let mut records = Vec::new();
        for item in &items {
            let fields = &item["fields"];
            let url_value = match &fields["url"] {
                Value::Object(obj) => obj.get("link").and_then(Value::as_str),
                Value::String(s) => Some(s.as_str()),
                _ => None,
            };
            let Some(url_value) = url_value else { continue };
            let url_key = canonicalize_url(url_value);
            if url_key.is_empty() {
                continue;
            }

            let source = fields["source"]
                .as_str()
                .or_else(|| fields["source"].as_array().and_then(|a| a.first()?.as_str()))
                .and_then(Source::from_str_loose);

            let created_at = item["created_time"]
                .as_i64()
                .or_else(|| fields["created_time"].as_i64())
                .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms))
                .or_else(|| {
                    fields["publish_date"]
                        .as_i64()
                        .and_then(DateTime::<Utc>::from_timestamp_millis)
                });

            records.push(ExistingRecord {
                url_key,
                source,
                created_at,
            });
        }

        info!(count = records.len(), "grid existing records read");
        Ok(records)
    }

    /// Canonical URLs already stored, bounded by each record's per-source
    /// dedup window. Records with unknown source or age use the widest window.
    pub async fn recent_url_keys(&self, now: DateTime<Utc>) -> Result<HashSet<String>, GridError> {
        let records = self.existing_records().await?;
        let mut keys = HashSet::new();
        for record in records {
            let window = record.source.map(dedup_window_days).unwrap_or(60);
            let in_window = match record.created_at {
                Some(t) => now.signed_duration_since(t) <= chrono::Duration::days(window),
                None => true,
            };
            if in_window {
                keys.insert(record.url_key);
            }
        }
        Ok(keys)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Save candidates in batches of 20 with 0.6 s pacing to stay under the
    /// platform's request budget. Batch-level failures accumulate into
    /// `failed` so the caller can divert them; they are never dropped here.
    pub async fn save(
        &self,
        candidates: Vec<ScoredCandidate>,
        now: DateTime<Utc>,
    ) -> Result<GridSaveOutcome, GridError> {
        let mut outcome = GridSaveOutcome::default();
        if candidates.is_empty() {
            return Ok(outcome);
        }

        self.ensure_token().await?;
        let fields = self.ensure_fields().await?;
        let mut existing = self.recent_url_keys(now).await?;

        let mut to_write: Vec<ScoredCandidate> = Vec::new();
        for candidate in candidates {
            let key = canonicalize_url(&candidate.raw.url);
            if !key.is_empty() && existing.contains(&key) {
                outcome.skipped_existing.push(key);
                continue;
            }
            to_write.push(candidate);
        }
        if !outcome.skipped_existing.is_empty() {
            info!(
                skipped = outcome.skipped_existing.len(),
                "grid save: dropped already-present URLs"
            );
        }

        let batches: Vec<Vec<ScoredCandidate>> = to_write
            .chunks(GRID_BATCH_SIZE)
            .map(|c| c.to_vec())
            .collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            match self.write_batch(&batch, &fields).await {
                Ok(()) => {
                    for candidate in &batch {
                        let key = canonicalize_url(&candidate.raw.url);
                        if !key.is_empty() {
                            existing.insert(key);
                        }
                    }
                    outcome.saved.extend(batch);
                }
                Err(e) => {
                    warn!(batch = i, error = %e, "grid batch write failed, diverting contents");
                    outcome.failed.extend(batch);
                }
            }
            if i + 1 < batch_count {
                tokio::time::sleep(Duration::from_secs_f64(GRID_BATCH_PACING_SECS)).await;
            }
        }

        info!(
            saved = outcome.saved.len(),
            failed = outcome.failed.len(),
            "grid save complete"
        );
        Ok(outcome)
    }

    async fn write_batch(
        &self,
        batch: &[ScoredCandidate],
        field_names: &HashSet<String>,
    ) -> Result<(), GridError> {
        let records: Vec<Value> = batch
            .iter()
            .map(|c| {
                let fields = filter_fields(to_record_fields(c), field_names);
                json!({ "fields": fields })
            })
            .collect();

        if records
            .iter()
            .all(|r| r["fields"].as_object().is_some_and(|m| m.is_empty()))
        {
            return Err(GridError::Mapping(
                "no candidate field matches a table column".into(),
            ));
        }

        let url = format!(
            "{}/bitable/v1/apps/{}/tables/{}/records/batch_create",
            self.base_url, self.app_token, self.table_id
        );
        let token = self.ensure_token().await?;
        let expected = records.len();
        let body = json!({ "records": records });

        let data: Value = retry_async(self.retry, "grid.batch_create", || {
            let token = token.clone();
            let body = body.clone();
            let url = url.clone();
            async move {
                let resp = self
                    .http
                    .post(&url)
                    .bearer_auth(token)
                    .json(&body)
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(GridError::Request(format!("batch_create HTTP {status}")));
                }
                Ok(resp.json::<Value>().await?)
            }
        })
        .await?;

        let code = data.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if code != 0 {
            let msg = data
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return Err(GridError::Api { code, msg });
        }

        let created = data["data"]["records"]
            .as_array()
            .map(Vec::len)
            .unwrap_or(0);
        if created != expected {
            return Err(GridError::Api {
                code: 0,
                msg: format!("partial batch write: expected {expected}, created {created}"),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Image upload (chat platform image endpoint, same tenant token)
    // ------------------------------------------------------------------

    pub async fn upload_image(&self, png: Vec<u8>, name: &str) -> Result<String, GridError> {
        let token = self.ensure_token().await?;
        let url = format!("{}/im/v1/images", self.base_url);

        let part = reqwest::multipart::Part::bytes(png)
            .file_name(name.to_string())
            .mime_str("image/png")
            .map_err(|e| GridError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("image_type", "message")
            .part("image", part);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GridError::Request(format!("image upload HTTP {status}")));
        }
        let data: Value = resp.json().await?;
        let code = data.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if code != 0 {
            let msg = data
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return Err(GridError::Api { code, msg });
        }
        data["data"]["image_key"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GridError::Api {
                code: 0,
                msg: "image upload returned no key".into(),
            })
    }
}

// ----------------------------------------------------------------------
// Record serialization
// ----------------------------------------------------------------------

fn truncate(s: &str, max: usize) -> String {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn list_to_str(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(truncate(&items.join(", "), 200))
    }
}

/// Flatten a scored candidate into the grid's column map. Column names are
/// validated against the discovered set before writing.
fn to_record_fields(c: &ScoredCandidate) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    let s = &c.scores;

    fields.insert("title".into(), json!(c.raw.title));
    fields.insert("source".into(), json!(c.raw.source.to_string()));
    fields.insert("url".into(), json!({ "link": c.raw.url }));
    if let Some(ref abs) = c.raw.abstract_text {
        fields.insert("abstract".into(), json!(truncate(abs, 2000)));
    }
    fields.insert("activity".into(), json!(s.activity));
    fields.insert("reproducibility".into(), json!(s.reproducibility));
    fields.insert("license".into(), json!(s.license));
    fields.insert("novelty".into(), json!(s.novelty));
    fields.insert("relevance".into(), json!(s.relevance));
    fields.insert(
        "total_score".into(),
        json!((c.total_score * 100.0).round() / 100.0),
    );
    fields.insert("priority".into(), json!(c.priority().to_string()));
    fields.insert(
        "reasoning".into(),
        json!(truncate(&s.overall_reasoning, REASONING_PREVIEW_CHARS)),
    );
    fields.insert("status".into(), json!("new"));

    if let Some(stars) = c.raw.github_stars {
        fields.insert("github_stars".into(), json!(stars));
    }
    if let Some(ref u) = c.raw.github_url {
        fields.insert("github_url".into(), json!({ "link": u }));
    }
    if let Some(ref u) = c.raw.paper_url {
        fields.insert("paper_url".into(), json!({ "link": u }));
    }
    if let Some(ref u) = c.raw.dataset_url {
        fields.insert("dataset_url".into(), json!({ "link": u }));
    }
    if let Some(authors) = list_to_str(&c.raw.authors) {
        fields.insert("authors".into(), json!(authors));
    }
    if let Some(date) = c.raw.publish_date {
        fields.insert("publish_date".into(), json!(date.timestamp_millis()));
    }
    if let Some(ref lic) = c.raw.license_type {
        fields.insert("license_type".into(), json!(lic));
    }
    if let Some(ref t) = c.raw.task_type {
        fields.insert("task_type".into(), json!(t));
    }
    if let Some(metrics) = list_to_str(&c.raw.evaluation_metrics) {
        fields.insert("evaluation_metrics".into(), json!(metrics));
    }
    if !s.task_domain.is_empty() {
        fields.insert("task_domain".into(), json!([s.task_domain]));
    }
    if let Some(metrics) = list_to_str(&s.metrics) {
        fields.insert("metrics".into(), json!(metrics));
    }
    if let Some(baselines) = list_to_str(&s.baselines) {
        fields.insert("baselines".into(), json!(baselines));
    }
    if let Some(ref inst) = s.institution {
        fields.insert("institution".into(), json!(truncate(inst, 200)));
    }
    if let Some(size) = s.dataset_size {
        fields.insert("dataset_size".into(), json!(size));
    }
    if let Some(ref key) = c.raw.hero_image_key {
        fields.insert("image_key".into(), json!(key));
    }

    fields
}

fn filter_fields(
    fields: serde_json::Map<String, Value>,
    known: &HashSet<String>,
) -> serde_json::Map<String, Value> {
    fields
        .into_iter()
        .filter(|(name, _)| known.contains(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchscout_common::{RawCandidate, ScoreSet, ScoreWeights};

    fn sample() -> ScoredCandidate {
        let mut raw = RawCandidate::new(
            "SWE-bench",
            "https://github.com/princeton-nlp/SWE-bench",
            Source::Github,
        );
        raw.github_stars = Some(1500);
        raw.github_url = Some(raw.url.clone());
        raw.authors = vec!["A. Person".into(), "B. Person".into()];
        let scores = ScoreSet {
            activity: 8.0,
            reproducibility: 9.0,
            license: 10.0,
            novelty: 7.0,
            relevance: 8.5,
            overall_reasoning: "solid benchmark".into(),
            task_domain: "Coding".into(),
            ..ScoreSet::default()
        };
        ScoredCandidate::from_parts(raw, scores, &ScoreWeights::default())
    }

    #[test]
    fn record_carries_core_columns() {
        let fields = to_record_fields(&sample());
        assert_eq!(fields["title"], "SWE-bench");
        assert_eq!(fields["source"], "github");
        assert_eq!(fields["url"]["link"], "https://github.com/princeton-nlp/SWE-bench");
        assert_eq!(fields["priority"], "high");
        assert_eq!(fields["github_stars"], 1500);
        assert_eq!(fields["authors"], "A. Person, B. Person");
    }

    #[test]
    fn unknown_columns_filtered_out() {
        let fields = to_record_fields(&sample());
        let known: HashSet<String> = ["title", "url", "total_score"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let filtered = filter_fields(fields, &known);
        assert_eq!(filtered.len(), 3);
        assert!(filtered.contains_key("title"));
        assert!(!filtered.contains_key("priority"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "日本語テキスト";
        let out = truncate(s, 4);
        assert!(out.len() <= 4);
        assert!(s.starts_with(&out));
    }
}
