//! Generator backends
//!
//! `openai` talks to an OpenAI-compatible chat-completions endpoint; `dry-run`
//! answers every prompt with the placeholder and never touches the network.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tabchain_core::{Completion, GenerationOptions, Generator, GeneratorError};
use tracing::warn;

/// System message sent with every prompt
pub(crate) const SYSTEM_INSTRUCTION: &str =
    "I will give you some examples, you need to follow the examples and complete the text, and no other content.";

const CONTEXT_OVERFLOW: &str = "maximum context length";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for [`OpenAiGenerator`]
#[derive(Debug, Clone)]
pub(crate) struct OpenAiConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) timeout_secs: u64,
    /// Retries after the first attempt
    pub(crate) retry_limit: u32,
    pub(crate) retry_delay: Duration,
}

impl OpenAiConfig {
    pub(crate) fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 120,
            retry_limit: 3,
            retry_delay: Duration::from_secs(60),
        }
    }

    pub(crate) fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Chat-completions backend
///
/// The endpoint returns no scores, so the i-th of n choices gets the
/// positional log score `ln((n - i) / n)`.
#[derive(Debug, Clone)]
pub(crate) struct OpenAiGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    pub(crate) fn new(config: OpenAiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn request_body(&self, prompt: &str, options: &GenerationOptions) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_INSTRUCTION },
                { "role": "user", "content": prompt },
            ],
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_output_tokens,
            "n": options.sample_count,
        });
        if let Some(stop) = &options.stop {
            body["stop"] = json!(stop);
        }
        body
    }

    async fn request_once(&self, body: &Value) -> Result<Vec<String>, GeneratorError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(if text.contains(CONTEXT_OVERFLOW) {
                GeneratorError::InvalidResponse(text)
            } else {
                GeneratorError::Unavailable(format!("{status}: {text}"))
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;
        parse_choices(&data)
    }

    fn transport_error(&self, err: &reqwest::Error) -> GeneratorError {
        if err.is_timeout() {
            GeneratorError::Timeout {
                duration_secs: self.config.timeout_secs,
            }
        } else {
            GeneratorError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<Completion>, GeneratorError> {
        let body = self.request_body(prompt, options);
        let mut attempt = 0u32;
        loop {
            match self.request_once(&body).await {
                Ok(texts) => return Ok(positional_scores(texts)),
                Err(GeneratorError::InvalidResponse(msg)) if msg.contains(CONTEXT_OVERFLOW) => {
                    warn!("prompt exceeds the model context, answering with the placeholder");
                    return Ok(vec![Completion::placeholder()]);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.config.retry_limit => {
                    warn!("giving up after {} attempts: {}", attempt + 1, e);
                    return Ok(vec![Completion::placeholder()]);
                }
                Err(e) => {
                    warn!("attempt {} failed, retrying in {:?}: {}", attempt + 1, self.config.retry_delay, e);
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Message contents of every choice, in response order
fn parse_choices(data: &Value) -> Result<Vec<String>, GeneratorError> {
    let choices = data["choices"]
        .as_array()
        .filter(|choices| !choices.is_empty())
        .ok_or_else(|| GeneratorError::InvalidResponse("response has no choices".into()))?;
    Ok(choices
        .iter()
        .map(|choice| choice["message"]["content"].as_str().unwrap_or_default().to_string())
        .collect())
}

#[allow(clippy::cast_precision_loss)]
fn positional_scores(texts: Vec<String>) -> Vec<Completion> {
    let n = texts.len() as f64;
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Completion::new(text, ((n - i as f64) / n).ln()))
        .collect()
}

/// Offline backend
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DryRunGenerator;

#[async_trait]
impl Generator for DryRunGenerator {
    async fn complete(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Vec<Completion>, GeneratorError> {
        Ok(vec![Completion::placeholder()])
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn generator() -> OpenAiGenerator {
        OpenAiGenerator::new(OpenAiConfig::new("key", "gpt-test").with_base_url("http://localhost:1/v1/"))
            .unwrap()
    }

    #[test]
    fn first_choice_scores_zero() {
        let completions = positional_scores(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        let confidences: Vec<f64> = completions.iter().map(Completion::confidence).collect();

        assert!((confidences[0] - 1.0).abs() < 1e-12);
        assert!((confidences[1] - 0.75).abs() < 1e-12);
        assert!((confidences[3] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn body_carries_options_and_stop() {
        let options = GenerationOptions::greedy(200).sampled(0.5, 8).with_stop("\n\n");
        let body = generator().request_body("prompt text", &options);

        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["n"], 8);
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["stop"], "\n\n");
        assert_eq!(body["messages"][0]["content"], SYSTEM_INSTRUCTION);
        assert_eq!(body["messages"][1]["content"], "prompt text");
    }

    #[test]
    fn choices_are_read_in_order() {
        let data = json!({
            "choices": [
                { "message": { "content": "first" } },
                { "message": { "content": null } },
            ]
        });
        assert_eq!(parse_choices(&data).unwrap(), vec!["first".to_string(), String::new()]);
        assert!(parse_choices(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(generator().config.base_url, "http://localhost:1/v1");
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_placeholder() {
        let mut config = OpenAiConfig::new("key", "gpt-test").with_base_url("http://127.0.0.1:9");
        config.retry_limit = 1;
        config.retry_delay = Duration::from_millis(1);
        config.timeout_secs = 2;
        let generator = OpenAiGenerator::new(config).unwrap();

        let completions = generator
            .complete("p", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completions, vec![Completion::placeholder()]);
    }

    #[tokio::test]
    async fn dry_run_returns_placeholder() {
        let completions = DryRunGenerator
            .complete("anything", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completions, vec![Completion::placeholder()]);
    }
}
