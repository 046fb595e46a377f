// Answer generation over a chat-completion API


use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ApiKey, AuthStyle, ConfigError, GenerationConfig};
use crate::http::{HttpClient, HttpError};

/// Returned when the provider answers with no choices
pub const NO_RESPONSE: &str = "No response from AI.";

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an AI assistant. Answer based on the given context.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Chat completion request failed: {0}")]
    Upstream(#[from] HttpError),

    #[error("Chat completion response is malformed: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    #[inline]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Upstream(HttpError::Timeout))
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The user turn: the query followed by the retrieved context
#[inline]
pub fn user_prompt(query: &str, context: &str) -> String {
    format!("{query}\n\nContext: {context}")
}

#[inline]
pub fn build_messages(system_prompt: &str, query: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: Role::System,
            content: system_prompt.to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: user_prompt(query, context),
        },
    ]
}

/// Produces an answer to `query` grounded in `context`
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-style `/chat/completions` client (Segmind by default)
#[derive(Debug, Clone)]
pub struct ChatCompletionGenerator {
    http: HttpClient,
    endpoint: Url,
    model: Option<String>,
    auth: AuthStyle,
    api_key: ApiKey,
    system_prompt: String,
}

impl ChatCompletionGenerator {
    #[inline]
    pub fn new(endpoint: Url, api_key: ApiKey) -> Self {
        Self {
            http: HttpClient::default(),
            endpoint,
            model: None,
            auth: AuthStyle::Bearer,
            api_key,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    #[inline]
    pub fn from_config(config: &GenerationConfig, api_key: ApiKey) -> Result<Self, ConfigError> {
        let mut generator = Self::new(config.endpoint_url()?, api_key)
            .with_http(HttpClient::new(config.timeout()).with_retry_attempts(config.retry_attempts))
            .with_auth(config.auth)
            .with_system_prompt(&config.system_prompt);
        generator.model.clone_from(&config.model);
        Ok(generator)
    }

    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[inline]
    pub const fn with_auth(mut self, auth: AuthStyle) -> Self {
        self.auth = auth;
        self
    }

    #[inline]
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        prompt.clone_into(&mut self.system_prompt);
        self
    }

    #[inline]
    pub fn with_http(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }
}

impl AnswerGenerator for ChatCompletionGenerator {
    fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError> {
        let messages = build_messages(&self.system_prompt, query, context);
        let request = ChatRequest {
            model: self.model.as_deref(),
            messages: &messages,
        };

        let bearer;
        let header = match self.auth {
            AuthStyle::Bearer => {
                bearer = format!("Bearer {}", self.api_key.expose());
                ("Authorization", bearer.as_str())
            }
            AuthStyle::ApiKeyHeader => ("x-api-key", self.api_key.expose()),
        };

        debug!(
            "Requesting completion (query: {} chars, context: {} chars)",
            query.len(),
            context.len()
        );

        let response: ChatResponse = self
            .http
            .post_json(&self.endpoint, &[header], &request)
            .map_err(|e| match e {
                HttpError::Decode(message) => GenerationError::MalformedResponse(message),
                other => GenerationError::Upstream(other),
            })?;

        let Some(choice) = response.choices.into_iter().next() else {
            warn!("Provider returned no choices");
            return Ok(NO_RESPONSE.to_string());
        };

        let content = choice
            .message
            .and_then(|message| message.content)
            .ok_or_else(|| {
                GenerationError::MalformedResponse("choices[0].message.content is missing".to_string())
            })?;

        let answer = content.trim();
        if answer.is_empty() {
            warn!("Provider returned an empty answer");
            return Ok(NO_RESPONSE.to_string());
        }

        debug!("Generated answer ({} chars)", answer.len());
        Ok(answer.to_string())
    }
}
