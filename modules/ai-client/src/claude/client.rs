use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use super::types::*;
use crate::util::truncate_to_char_boundary;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upstream error bodies can echo an entire scoring prompt back; cap what
/// reaches the error chain and the run diagnostics.
const ERROR_BODY_MAX_BYTES: usize = 600;

pub(crate) struct ClaudeClient {
    http: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        // An unrepresentable key is left off; the API answers 401 and the
        // scorer's retry/fallback path takes over from there.
        if let Ok(key) = HeaderValue::from_str(api_key) {
            headers.insert("x-api-key", key);
        }
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            headers,
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = %request.model,
            turns = request.messages.len(),
            "scoring model request"
        );

        let response = self
            .http
            .post(&url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet = truncate_to_char_boundary(&body, ERROR_BODY_MAX_BYTES);
            return Err(anyhow!("model API returned {status}: {snippet}"));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_prepared_at_construction() {
        let client = ClaudeClient::new("sk-ant-test", Duration::from_secs(30));
        assert_eq!(client.headers.get("x-api-key").unwrap(), "sk-ant-test");
        assert_eq!(
            client.headers.get("anthropic-version").unwrap(),
            ANTHROPIC_VERSION
        );
    }

    #[test]
    fn unrepresentable_key_is_omitted() {
        let client = ClaudeClient::new("bad\nkey", Duration::from_secs(30));
        assert!(client.headers.get("x-api-key").is_none());
        // The version header is still present so the 401 is well-formed.
        assert!(client.headers.get("anthropic-version").is_some());
    }
}
