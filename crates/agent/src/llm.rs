use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use parley_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn provider_name(&self) -> &str;
}

/// Single-prompt completion client for the configured hosted or local provider.
#[derive(Clone)]
pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_tokens: u32,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            http,
            provider: config.provider,
            base_url: config.effective_base_url(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    async fn call_once(&self, prompt: &str) -> Result<String> {
        let mut request = self
            .http
            .post(endpoint(self.provider, &self.base_url))
            .json(&request_body(self.provider, &self.model, self.max_tokens, prompt));

        match (self.provider, &self.api_key) {
            (LlmProvider::Anthropic, Some(key)) => {
                request = request
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION);
            }
            (LlmProvider::OpenAi, Some(key)) => {
                request = request.bearer_auth(key.expose_secret());
            }
            (LlmProvider::Anthropic | LlmProvider::OpenAi, None) => {
                return Err(anyhow!("{} api key is not configured", provider_label(self.provider)));
            }
            (LlmProvider::Ollama, _) => {}
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {}: {}", provider_label(self.provider), status, body));
        }

        let body = response.text().await?;
        parse_response(self.provider, &body)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.call_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.retry",
                        provider = provider_label(self.provider),
                        attempt,
                        error = %error,
                        "llm call failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn provider_name(&self) -> &str {
        provider_label(self.provider)
    }
}

fn provider_label(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Anthropic => "Anthropic",
        LlmProvider::OpenAi => "OpenAI",
        LlmProvider::Ollama => "Ollama",
    }
}

fn endpoint(provider: LlmProvider, base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    match provider {
        LlmProvider::Anthropic => format!("{base_url}/v1/messages"),
        LlmProvider::OpenAi => format!("{base_url}/v1/chat/completions"),
        LlmProvider::Ollama => format!("{base_url}/api/generate"),
    }
}

fn request_body(provider: LlmProvider, model: &str, max_tokens: u32, prompt: &str) -> Value {
    match provider {
        LlmProvider::Anthropic => json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}]
        }),
        LlmProvider::OpenAi => json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}]
        }),
        LlmProvider::Ollama => json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {"num_predict": max_tokens}
        }),
    }
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Extracts the completion text from a provider response body.
fn parse_response(provider: LlmProvider, body: &str) -> Result<String> {
    let text = match provider {
        LlmProvider::Anthropic => serde_json::from_str::<AnthropicResponse>(body)?
            .content
            .into_iter()
            .find_map(|block| block.text),
        LlmProvider::OpenAi => serde_json::from_str::<OpenAiResponse>(body)?
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content),
        LlmProvider::Ollama => Some(serde_json::from_str::<OllamaResponse>(body)?.response),
    };

    text.filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("Empty response from {}", provider_label(provider)))
}

#[cfg(test)]
mod tests {
    use parley_core::config::{LlmConfig, LlmProvider};

    use super::{endpoint, parse_response, request_body, HttpLlmClient, LlmClient};

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("sk-test".to_string().into()),
            base_url: None,
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            max_tokens: 256,
        }
    }

    #[test]
    fn client_uses_provider_default_base_url() {
        let client = HttpLlmClient::from_config(&config(LlmProvider::Anthropic)).expect("client");
        assert_eq!(client.provider_name(), "Anthropic");
        assert_eq!(client.model_name(), "test-model");
        assert_eq!(client.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn endpoints_follow_provider_conventions() {
        assert_eq!(
            endpoint(LlmProvider::Anthropic, "https://api.anthropic.com/"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            endpoint(LlmProvider::OpenAi, "https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint(LlmProvider::Ollama, "http://localhost:11434"),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn request_bodies_carry_model_and_prompt() {
        let anthropic = request_body(LlmProvider::Anthropic, "m", 128, "hello");
        assert_eq!(anthropic["model"], "m");
        assert_eq!(anthropic["max_tokens"], 128);
        assert_eq!(anthropic["messages"][0]["content"], "hello");

        let ollama = request_body(LlmProvider::Ollama, "llama3", 64, "hello");
        assert_eq!(ollama["prompt"], "hello");
        assert_eq!(ollama["stream"], false);
        assert_eq!(ollama["options"]["num_predict"], 64);
    }

    #[test]
    fn parses_each_provider_response_shape() {
        let anthropic = r#"{"content":[{"type":"text","text":"{\"answer\":\"yes\"}"}]}"#;
        assert_eq!(
            parse_response(LlmProvider::Anthropic, anthropic).expect("anthropic"),
            r#"{"answer":"yes"}"#
        );

        let openai = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        assert_eq!(parse_response(LlmProvider::OpenAi, openai).expect("openai"), "hi");

        let ollama = r#"{"model":"llama3","response":"hey","done":true}"#;
        assert_eq!(parse_response(LlmProvider::Ollama, ollama).expect("ollama"), "hey");
    }

    #[test]
    fn empty_or_malformed_responses_are_errors() {
        assert!(parse_response(LlmProvider::Anthropic, r#"{"content":[]}"#).is_err());
        assert!(parse_response(LlmProvider::OpenAi, r#"{"choices":[]}"#).is_err());
        assert!(parse_response(LlmProvider::Ollama, "not json").is_err());
    }
}
