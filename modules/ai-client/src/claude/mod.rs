mod client;
pub(crate) mod types;

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::schema::StructuredOutput;
use client::ClaudeClient;
use types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const STRUCTURED_TOOL_NAME: &str = "structured_response";

/// One prior round of a structured conversation: what the model returned and
/// what the caller wants changed. Used to replay history on a re-prompt.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The model's previous structured answer, serialized.
    pub assistant_json: String,
    /// The follow-up instruction asking for a corrected answer.
    pub follow_up: String,
}

/// Anthropic Messages API agent with structured output via forced tool use.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    fn structured_request<T: StructuredOutput>(
        &self,
        system_prompt: &str,
        max_tokens: u32,
    ) -> ChatRequest {
        let mut request = ChatRequest::new(&self.model)
            .system(system_prompt)
            .max_tokens(max_tokens)
            .temperature(0.2)
            .tool(ToolDefinitionWire {
                name: STRUCTURED_TOOL_NAME.to_string(),
                description: "Return the structured result for the input.".to_string(),
                input_schema: T::output_schema(),
            });
        request.tool_choice = Some(serde_json::json!({
            "type": "tool",
            "name": STRUCTURED_TOOL_NAME,
        }));
        request
    }

    /// One-shot structured extraction: system + user prompt, schema-forced
    /// tool output deserialized into `T`.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        max_tokens: u32,
    ) -> Result<T> {
        let request = self
            .structured_request::<T>(&system_prompt.into(), max_tokens)
            .message(WireMessage::user(user_prompt));
        self.send_structured(request).await
    }

    /// Structured extraction that replays prior exchanges before the final
    /// user turn. Each exchange contributes an assistant message carrying the
    /// previous structured answer and a user message with the correction
    /// request, so the model can revise rather than start over.
    pub async fn extract_with_history<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        history: &[Exchange],
        max_tokens: u32,
    ) -> Result<T> {
        let mut request = self
            .structured_request::<T>(&system_prompt.into(), max_tokens)
            .message(WireMessage::user(user_prompt));
        for exchange in history {
            request = request
                .message(WireMessage::assistant(exchange.assistant_json.clone()))
                .message(WireMessage::user(exchange.follow_up.clone()));
        }
        self.send_structured(request).await
    }

    async fn send_structured<T: StructuredOutput>(&self, request: ChatRequest) -> Result<T> {
        let response = self.client().chat(&request).await?;
        let input = response
            .tool_input()
            .ok_or_else(|| anyhow!("no structured output in model response"))?;
        serde_json::from_value(input.clone())
            .map_err(|e| anyhow!("failed to deserialize structured response: {e}"))
    }

    /// Plain text completion, used where structured output is overkill.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .system(system)
            .message(WireMessage::user(user))
            .max_tokens(4096)
            .temperature(0.0);

        let response = self.client().chat(&request).await?;
        response
            .text()
            .ok_or_else(|| anyhow!("no text in model response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_new_stores_model() {
        let ai = Claude::new("sk-ant-test", "claude-haiku-4-5-20251001");
        assert_eq!(ai.model(), "claude-haiku-4-5-20251001");
    }

    #[test]
    fn claude_with_base_url() {
        let ai = Claude::new("sk-ant-test", "m").with_base_url("https://custom.api.com");
        assert_eq!(ai.base_url.as_deref(), Some("https://custom.api.com"));
    }

    #[test]
    fn history_messages_interleave() {
        use schemars::JsonSchema;
        use serde::Deserialize;

        #[derive(Deserialize, JsonSchema)]
        struct Out {
            #[allow(dead_code)]
            value: String,
        }

        let ai = Claude::new("k", "m");
        let mut request = ai
            .structured_request::<Out>("sys", 256)
            .message(WireMessage::user("score this"));
        let history = [Exchange {
            assistant_json: "{\"value\": \"short\"}".to_string(),
            follow_up: "lengthen the value field".to_string(),
        }];
        for exchange in &history {
            request = request
                .message(WireMessage::assistant(exchange.assistant_json.clone()))
                .message(WireMessage::user(exchange.follow_up.clone()));
        }

        let value = serde_json::to_value(&request).unwrap();
        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");
    }
}
