
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{Embedder, EmbeddingError, check_dimension, require_text};
use crate::config::{ApiKey, EmbeddingConfig, EmbeddingProvider};
use crate::http::{HttpClient, HttpError};

#[derive(Debug, Serialize)]
struct InputRequest<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CohereRequest<'a> {
    texts: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input_type: &'a str,
}

#[derive(Debug, Serialize)]
struct HuggingFaceRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    data: Vec<DataItem>,
}

#[derive(Debug, Deserialize)]
struct DataItem {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Feature-extraction output is flat for sentence models and nested for
/// some pipelines
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HuggingFaceResponse {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

/// Which side of retrieval a text is on; only Cohere cares
#[derive(Debug, Clone, Copy)]
enum InputKind {
    Query,
    Document,
}

impl InputKind {
    const fn cohere_input_type(self) -> &'static str {
        match self {
            Self::Query => "search_query",
            Self::Document => "search_document",
        }
    }
}

/// Embedding over HTTP: OpenAI, Segmind, Cohere or Hugging Face inference
#[derive(Debug, Clone)]
pub struct RemoteEmbedder {
    provider: EmbeddingProvider,
    http: HttpClient,
    endpoint: Url,
    model: Option<String>,
    dimension: usize,
    api_key: ApiKey,
}

impl RemoteEmbedder {
    #[inline]
    pub fn new(
        provider: EmbeddingProvider,
        endpoint: Url,
        api_key: ApiKey,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        if provider == EmbeddingProvider::Local {
            return Err(EmbeddingError::ProviderUnavailable(
                "the local provider has no HTTP endpoint".to_string(),
            ));
        }

        Ok(Self {
            provider,
            http: HttpClient::default(),
            endpoint,
            model: provider.default_model().map(str::to_string),
            dimension,
            api_key,
        })
    }

    #[inline]
    pub fn from_config(config: &EmbeddingConfig, api_key: ApiKey) -> Result<Self, EmbeddingError> {
        let endpoint = config
            .endpoint()
            .map_err(|e| EmbeddingError::ProviderUnavailable(e.to_string()))?
            .ok_or_else(|| {
                EmbeddingError::ProviderUnavailable(format!(
                    "no endpoint configured for {}",
                    config.provider
                ))
            })?;

        let mut embedder = Self::new(config.provider, endpoint, api_key, config.dimension())?
            .with_http(HttpClient::new(config.timeout()).with_retry_attempts(config.retry_attempts));
        embedder.model = config.model();
        Ok(embedder)
    }

    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[inline]
    pub fn with_http(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub const fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    /// Hugging Face addresses the model in the path; everyone else takes it
    /// in the body
    fn request_url(&self) -> Result<Url, EmbeddingError> {
        if self.provider != EmbeddingProvider::HuggingFace {
            return Ok(self.endpoint.clone());
        }

        let model = self.model.as_deref().ok_or_else(|| {
            EmbeddingError::ProviderUnavailable("huggingface requires a model".to_string())
        })?;
        let joined = format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), model);
        Url::parse(&joined).map_err(|e| EmbeddingError::ProviderUnavailable(e.to_string()))
    }

    fn request(&self, text: &str, kind: InputKind) -> Result<Vec<f32>, EmbeddingError> {
        let text = require_text(text)?;
        let url = self.request_url()?;
        let bearer = format!("Bearer {}", self.api_key.expose());
        let headers = [("Authorization", bearer.as_str())];
        let model = self.model.as_deref();

        debug!(
            "Requesting {} embedding for text (length: {})",
            self.provider,
            text.len()
        );

        let vector = match self.provider {
            EmbeddingProvider::OpenAi | EmbeddingProvider::Segmind => {
                let response: DataResponse = self
                    .http
                    .post_json(&url, &headers, &InputRequest { input: text, model })
                    .map_err(upstream)?;
                response
                    .data
                    .into_iter()
                    .next()
                    .map(|item| item.embedding)
                    .ok_or_else(|| missing("data[0].embedding"))?
            }
            EmbeddingProvider::Cohere => {
                let request = CohereRequest {
                    texts: [text],
                    model,
                    input_type: kind.cohere_input_type(),
                };
                let response: CohereResponse =
                    self.http.post_json(&url, &headers, &request).map_err(upstream)?;
                response
                    .embeddings
                    .into_iter()
                    .next()
                    .ok_or_else(|| missing("embeddings[0]"))?
            }
            EmbeddingProvider::HuggingFace => {
                let response: HuggingFaceResponse = self
                    .http
                    .post_json(&url, &headers, &HuggingFaceRequest { inputs: text })
                    .map_err(upstream)?;
                match response {
                    HuggingFaceResponse::Flat(vector) => vector,
                    HuggingFaceResponse::Nested(rows) if rows.len() == 1 => {
                        rows.into_iter().next().unwrap_or_default()
                    }
                    HuggingFaceResponse::Nested(rows) => {
                        return Err(EmbeddingError::MalformedResponse(format!(
                            "expected one embedding row, got {}",
                            rows.len()
                        )));
                    }
                }
            }
            EmbeddingProvider::Local => {
                return Err(EmbeddingError::ProviderUnavailable(
                    "the local provider has no HTTP endpoint".to_string(),
                ));
            }
        };

        let vector = check_dimension(vector, self.dimension)?;
        debug!("Generated embedding with {} dimensions", vector.len());
        Ok(vector)
    }
}

impl Embedder for RemoteEmbedder {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.request(text, InputKind::Query)
    }

    #[inline]
    fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.request(text, InputKind::Document)
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn describe(&self) -> String {
        match &self.model {
            Some(model) => format!("{}/{}", self.provider, model),
            None => self.provider.to_string(),
        }
    }
}

fn upstream(error: HttpError) -> EmbeddingError {
    match error {
        HttpError::Decode(message) => EmbeddingError::MalformedResponse(message),
        other => EmbeddingError::Upstream(other),
    }
}

fn missing(field: &str) -> EmbeddingError {
    EmbeddingError::MalformedResponse(format!("response has no {field}"))
}
