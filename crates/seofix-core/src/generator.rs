//! Content generation collaborator used by fix strategies.
//!
//! `HttpContentGenerator` speaks the OpenAI-compatible chat-completions
//! protocol, which most hosted and self-hosted model servers expose.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors raised by content generators.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator not configured: {0}")]
    NotConfigured(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generator returned no content")]
    EmptyResponse,

    #[error("generator timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type GeneratorResult<T> = std::result::Result<T, GeneratorError>;

/// Produces text for a prompt.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> GeneratorResult<String>;
}

/// Stand-in used when no model endpoint is configured. Every call fails, so
/// strategies that need generated text report a plan failure instead of
/// writing placeholder copy.
#[derive(Debug, Default, Clone)]
pub struct UnconfiguredGenerator;

#[async_trait]
impl ContentGenerator for UnconfiguredGenerator {
    async fn complete(&self, _prompt: &str) -> GeneratorResult<String> {
        Err(GeneratorError::NotConfigured(
            "set SEOFIX_LLM_URL to enable generated content".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// HTTP generator
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You write concise, factual website copy. \
Reply with plain text only: no markdown, no HTML, no surrounding quotes.";

/// Chat-completions endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGeneratorConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl HttpGeneratorConfig {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: 0.3,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Read `SEOFIX_LLM_URL`, `SEOFIX_LLM_MODEL` and `SEOFIX_LLM_API_KEY`.
    /// Returns `None` when no URL is set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SEOFIX_LLM_URL").ok()?;
        let model = std::env::var("SEOFIX_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let mut config = Self::new(&base_url, &model);
        config.api_key = std::env::var("SEOFIX_LLM_API_KEY").ok();
        Some(config)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by an OpenAI-compatible HTTP API.
pub struct HttpContentGenerator {
    config: HttpGeneratorConfig,
    http_client: reqwest::Client,
}

impl HttpContentGenerator {
    pub fn new(config: HttpGeneratorConfig) -> GeneratorResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("seofix/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &HttpGeneratorConfig {
        &self.config
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn complete(&self, prompt: &str) -> GeneratorResult<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let mut request = self.http_client.post(self.config.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.config.model, prompt_chars = prompt.len(), "requesting completion");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GeneratorError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = HttpGeneratorConfig::new("http://localhost:8080/v1/", "local");
        assert_eq!(config.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "m",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["model"], "m");
    }

    #[test]
    fn test_response_parses_first_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"  Hello  "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let text = parsed.choices.into_iter().find_map(|c| c.message.content);
        assert_eq!(text.as_deref().map(str::trim), Some("Hello"));
    }

    #[tokio::test]
    async fn test_unconfigured_generator_fails() {
        let err = UnconfiguredGenerator.complete("hi").await.unwrap_err();
        assert!(matches!(err, GeneratorError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let generator =
            HttpContentGenerator::new(HttpGeneratorConfig::new("http://127.0.0.1:9", "m")).unwrap();
        let err = generator.complete("hi").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Http(_)));
    }
}
