
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::store::Metric;
use crate::text::chunking::{ChunkingError, SplitterConfig};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "docrag";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub generation: GenerationConfig,
    pub chunking: SplitterConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmbeddingProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "segmind")]
    Segmind,
    #[serde(rename = "cohere")]
    Cohere,
    #[serde(rename = "huggingface")]
    HuggingFace,
    #[serde(rename = "local")]
    Local,
}

impl EmbeddingProvider {
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Segmind => "segmind",
            Self::Cohere => "cohere",
            Self::HuggingFace => "huggingface",
            Self::Local => "local",
        }
    }

    #[inline]
    pub const fn default_model(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("text-embedding-3-small"),
            Self::Segmind => None,
            Self::Cohere => Some("embed-english-v3.0"),
            Self::HuggingFace => Some("sentence-transformers/all-MiniLM-L6-v2"),
            Self::Local => Some("bge-base-en-v1.5"),
        }
    }

    #[inline]
    pub const fn default_dimension(self) -> usize {
        match self {
            Self::OpenAi => 1536,
            Self::Segmind => 4096,
            Self::Cohere => 1024,
            Self::HuggingFace => 384,
            Self::Local => 768,
        }
    }

    /// Default HTTP endpoint; `None` for the in-process model
    #[inline]
    pub const fn default_endpoint(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1/embeddings"),
            Self::Segmind => Some("https://api.segmind.com/v1/embeddings"),
            Self::Cohere => Some("https://api.cohere.ai/v1/embed"),
            Self::HuggingFace => Some("https://api-inference.huggingface.co/models"),
            Self::Local => None,
        }
    }

    /// Environment variable holding the provider's API key
    #[inline]
    pub const fn api_key_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Segmind => Some("SEGMIND_API_KEY"),
            Self::Cohere => Some("COHERE_API_KEY"),
            Self::HuggingFace => Some("HF_API_KEY"),
            Self::Local => None,
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ConfigError;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "segmind" => Ok(Self::Segmind),
            "cohere" => Ok(Self::Cohere),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "local" => Ok(Self::Local),
            _ => Err(ConfigError::InvalidProvider(value.to_string())),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Overrides the provider's default model
    pub model: Option<String>,
    /// Overrides the provider's default vector dimension
    pub dimension: Option<usize>,
    /// Overrides the provider's default endpoint
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model: None,
            dimension: None,
            endpoint: None,
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn model(&self) -> Option<String> {
        self.model
            .clone()
            .or_else(|| self.provider.default_model().map(str::to_string))
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
            .unwrap_or_else(|| self.provider.default_dimension())
    }

    #[inline]
    pub fn endpoint(&self) -> Result<Option<Url>, ConfigError> {
        self.endpoint
            .as_deref()
            .or_else(|| self.provider.default_endpoint())
            .map(parse_url)
            .transpose()
    }

    #[inline]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Pinecone control-plane endpoint
    pub endpoint: String,
    pub index: String,
    pub namespace: String,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
    /// Data-plane host; discovered from the index description when unset
    pub index_host: Option<String>,
    pub top_k: usize,
    pub upsert_batch_size: usize,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub ready_poll_attempts: u32,
    pub ready_poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pinecone.io".to_string(),
            index: "chatagent-xenova".to_string(),
            namespace: "ns1".to_string(),
            metric: Metric::DotProduct,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            index_host: None,
            top_k: 5,
            upsert_batch_size: 100,
            timeout_secs: 30,
            retry_attempts: 3,
            ready_poll_attempts: 30,
            ready_poll_interval_ms: 2000,
        }
    }
}

impl StoreConfig {
    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_url(&self.endpoint)
    }

    #[inline]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[inline]
    pub const fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthStyle {
    #[serde(rename = "bearer")]
    Bearer,
    #[serde(rename = "x-api-key")]
    ApiKeyHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    /// Omitted from the request when the endpoint already names a model
    pub model: Option<String>,
    pub auth: AuthStyle,
    pub system_prompt: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.segmind.com/v1/chat/completions".to_string(),
            model: Some("llama3-8b-chat".to_string()),
            auth: AuthStyle::Bearer,
            system_prompt: "You are an AI assistant. Answer based on the given context."
                .to_string(),
            timeout_secs: 60,
            retry_attempts: 3,
        }
    }
}

impl GenerationConfig {
    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_url(&self.endpoint)
    }

    #[inline]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            allowed_origins: vec!["http://127.0.0.1:5500".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of chunks embedded concurrently
    pub concurrency: usize,
    /// Skip chunks whose embedding fails instead of aborting the run
    pub skip_failed_embeddings: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            skip_failed_embeddings: false,
        }
    }
}

/// An API key. Never serialized and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[inline]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Credentials injected from the environment at start-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub pinecone: Option<ApiKey>,
    pub segmind: Option<ApiKey>,
    pub openai: Option<ApiKey>,
    pub cohere: Option<ApiKey>,
    pub huggingface: Option<ApiKey>,
}

impl Secrets {
    #[inline]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(ApiKey)
        };

        Self {
            pinecone: read("PINECONE_API_KEY"),
            segmind: read("SEGMIND_API_KEY"),
            openai: read("OPENAI_API_KEY"),
            cohere: read("COHERE_API_KEY"),
            huggingface: read("HF_API_KEY").or_else(|| read("HUGGINGFACE_API_KEY")),
        }
    }

    /// Key used by the given embedding provider
    #[inline]
    pub const fn embedding_key(&self, provider: EmbeddingProvider) -> Option<&ApiKey> {
        match provider {
            EmbeddingProvider::OpenAi => self.openai.as_ref(),
            EmbeddingProvider::Segmind => self.segmind.as_ref(),
            EmbeddingProvider::Cohere => self.cohere.as_ref(),
            EmbeddingProvider::HuggingFace => self.huggingface.as_ref(),
            EmbeddingProvider::Local => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid top_k: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 20000)")]
    InvalidDimension(usize),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid {0} timeout: must be at least one second")]
    InvalidTimeout(&'static str),
    #[error("Invalid {0} retry attempts: must be at least 1")]
    InvalidRetryAttempts(&'static str),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),
    #[error("Unknown embedding provider: {0}")]
    InvalidProvider(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidEnvValue { key: String, value: String },
    #[error("Invalid chunking settings: {0}")]
    Chunking(#[from] ChunkingError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(ConfigError::InvalidUrl(raw.to_string())),
    }
}

impl Config {
    /// Directory holding the default configuration file
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides and secrets, then validate
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Ok(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        config
            .apply_env_overrides(|key| std::env::var(key).ok())
            .context("Invalid environment override")?;
        config.secrets = Secrets::from_env();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply non-secret overrides such as `PORT` and `PINECONE_INDEX`
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let parse = |key: &str, value: String| -> Result<usize, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    key: key.to_string(),
                    value,
                })
        };

        if let Some(port) = read("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(host) = read("HOST") {
            self.server.host = host;
        }
        if let Some(index) = read("PINECONE_INDEX") {
            self.store.index = index;
        }
        if let Some(namespace) = read("PINECONE_NAMESPACE") {
            self.store.namespace = namespace;
        }
        if let Some(provider) = read("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Some(model) = read("EMBEDDING_MODEL") {
            self.embedding.model = Some(model);
        }
        if let Some(size) = read("CHUNK_SIZE") {
            self.chunking.chunk_size = parse("CHUNK_SIZE", size)?;
        }
        if let Some(overlap) = read("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse("CHUNK_OVERLAP", overlap)?;
        }
        if let Some(origins) = read("CORS_ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        self.validate_embedding()?;
        self.validate_store()?;
        self.validate_generation()?;
        self.validate_server()?;

        if !(1..=64).contains(&self.ingest.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.ingest.concurrency));
        }

        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;

        if let Some(dimension) = embedding.dimension {
            if !(1..=20_000).contains(&dimension) {
                return Err(ConfigError::InvalidDimension(dimension));
            }
        }
        if embedding.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ConfigError::EmptyValue("embedding model"));
        }
        if embedding.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("embedding"));
        }
        if embedding.retry_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts("embedding"));
        }
        embedding.endpoint()?;
        Ok(())
    }

    fn validate_store(&self) -> Result<(), ConfigError> {
        let store = &self.store;

        if store.index.trim().is_empty() {
            return Err(ConfigError::EmptyValue("store index"));
        }
        if store.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyValue("store namespace"));
        }
        if store.top_k == 0 {
            return Err(ConfigError::InvalidTopK(store.top_k));
        }
        if !(1..=1000).contains(&store.upsert_batch_size) {
            return Err(ConfigError::InvalidBatchSize(store.upsert_batch_size));
        }
        if store.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("store"));
        }
        if store.retry_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts("store"));
        }
        store.endpoint_url()?;
        if let Some(host) = &store.index_host {
            crate::store::pinecone::host_url(host)
                .map_err(|_| ConfigError::InvalidUrl(host.clone()))?;
        }
        Ok(())
    }

    fn validate_generation(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;

        if generation.system_prompt.trim().is_empty() {
            return Err(ConfigError::EmptyValue("generation system prompt"));
        }
        if generation.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("generation"));
        }
        if generation.retry_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts("generation"));
        }
        generation.endpoint_url()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::EmptyValue("server host"));
        }
        for origin in &self.server.allowed_origins {
            let parsed =
                Url::parse(origin).map_err(|_| ConfigError::InvalidOrigin(origin.clone()))?;
            if parsed.host_str().is_none() || !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidOrigin(origin.clone()));
            }
        }
        Ok(())
    }
}
