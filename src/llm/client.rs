//! OpenAI-compatible Chat Completions client
//!
//! Retries timeouts, network failures and 5xx responses with exponential
//! backoff. `<think>` blocks emitted by reasoning models are logged at debug
//! level and stripped from the returned text.

use super::{CompletionRequest, LanguageModel};
use crate::{OdysseusError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const MAX_RETRY_ATTEMPTS: u32 = 4;
const RETRY_BASE_DELAY_MS: u64 = 200;
/// Reflections over long pages can take a while
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Model output with reasoning separated from the answer
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub thinking: Option<String>,
    pub response: String,
}

/// Chat Completions client for OpenAI and compatible servers
pub struct ChatClient {
    client: Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(OdysseusError::Auth("empty API key".to_string()));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OdysseusError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Split `<think>...</think>` reasoning from the answer.
    pub fn parse_think_tags(content: &str) -> ParsedResponse {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("static regex compiles"));

        if let Some(caps) = re.captures(content) {
            let thinking = caps.get(1).map(|m| m.as_str().trim().to_string());
            let response = re.replace_all(content, "").trim().to_string();
            ParsedResponse { thinking, response }
        } else if content.starts_with("<think>") {
            // Unterminated: the model ran out of tokens while thinking
            let thinking = content.trim_start_matches("<think>").trim().to_string();
            ParsedResponse {
                thinking: Some(thinking),
                response: String::new(),
            }
        } else {
            ParsedResponse {
                thinking: None,
                response: content.trim().to_string(),
            }
        }
    }

    async fn send_chat_request(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.user,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: request.temperature,
            response_format: request
                .json_response
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;

        let response = Self::check_response_status(response).await?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OdysseusError::Llm(format!("malformed response: {e}")))?;

        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(OdysseusError::Auth(Self::extract_error_detail(&body)));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = Self::truncate_error_detail(&Self::extract_error_detail(&body), 500);
        let prefix = if status.is_server_error() {
            "retryable API error"
        } else {
            "API error"
        };
        if detail.is_empty() {
            Err(OdysseusError::Llm(format!("{prefix} {status}")))
        } else {
            Err(OdysseusError::Llm(format!("{prefix} {status}: {detail}")))
        }
    }

    fn extract_error_detail(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(msg) = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
            if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
            if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
                return msg.to_string();
            }
        }

        trimmed.to_string()
    }

    fn truncate_error_detail(detail: &str, max_chars: usize) -> String {
        if detail.chars().count() <= max_chars {
            return detail.to_string();
        }
        let mut truncated = detail.chars().take(max_chars).collect::<String>();
        truncated.push_str("... [truncated]");
        truncated
    }

    fn map_reqwest_error(e: reqwest::Error) -> OdysseusError {
        if e.is_timeout() {
            OdysseusError::Llm(format!("timeout: {e}"))
        } else if e.is_connect() {
            OdysseusError::Llm(format!("network: {e}"))
        } else {
            OdysseusError::Llm(e.to_string())
        }
    }

    /// Exponential backoff with a small deterministic jitter
    fn retry_backoff(attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        let base_ms = RETRY_BASE_DELAY_MS.saturating_mul(exp);
        let jitter = 1.0 + ((attempt as f64 * 0.37).sin() * 0.1);
        Duration::from_millis((base_ms as f64 * jitter) as u64)
    }

    fn is_retryable(err: &OdysseusError) -> bool {
        let OdysseusError::Llm(msg) = err else {
            return false;
        };
        msg.contains("timeout")
            || msg.contains("network")
            || msg.contains("retryable")
            || msg.contains("error sending request")
            || msg.contains("connection")
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(
            "Calling {} (prompt {} chars, json: {})",
            self.model,
            request.user.len(),
            request.json_response
        );

        let mut last_err = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let delay = Self::retry_backoff(attempt);
                warn!(
                    "LLM request failed (attempt {}/{}), retrying in {:?}...",
                    attempt, MAX_RETRY_ATTEMPTS, delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_chat_request(request).await {
                Ok(content) => {
                    let parsed = Self::parse_think_tags(&content);
                    if let Some(thinking) = &parsed.thinking {
                        debug!("LLM thinking: {}", thinking);
                    }
                    return Ok(parsed.response);
                }
                Err(e) if Self::is_retryable(&e) && attempt + 1 < MAX_RETRY_ATTEMPTS => {
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| OdysseusError::Llm("all retry attempts exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_think_tags() {
        let parsed = ChatClient::parse_think_tags("<think>hmm, cats</think>\n{\"search_for\": \"cats\"}");
        assert_eq!(parsed.thinking.as_deref(), Some("hmm, cats"));
        assert_eq!(parsed.response, "{\"search_for\": \"cats\"}");

        let unterminated = ChatClient::parse_think_tags("<think>still going");
        assert_eq!(unterminated.response, "");

        let plain = ChatClient::parse_think_tags("  plain  ");
        assert_eq!(plain.thinking, None);
        assert_eq!(plain.response, "plain");
    }

    #[test]
    fn test_extract_error_detail() {
        assert_eq!(
            ChatClient::extract_error_detail(r#"{"error": {"message": "Rate limit"}}"#),
            "Rate limit"
        );
        assert_eq!(ChatClient::extract_error_detail(r#"{"message": "nope"}"#), "nope");
        assert_eq!(ChatClient::extract_error_detail("plain text"), "plain text");
        assert_eq!(ChatClient::extract_error_detail("  "), "");
    }

    #[test]
    fn test_backoff_grows() {
        let first = ChatClient::retry_backoff(1);
        let third = ChatClient::retry_backoff(3);
        assert!(third > first);
        assert!(first >= Duration::from_millis(180));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ChatClient::is_retryable(&OdysseusError::Llm("timeout: x".to_string())));
        assert!(ChatClient::is_retryable(&OdysseusError::Llm("retryable API error 503".to_string())));
        assert!(!ChatClient::is_retryable(&OdysseusError::Llm("API error 400".to_string())));
        assert!(!ChatClient::is_retryable(&OdysseusError::Auth("bad key".to_string())));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            ChatClient::new(" ", DEFAULT_BASE_URL, "gpt-4o"),
            Err(OdysseusError::Auth(_))
        ));
    }
}
