// Embeddings module
// One `Embedder` interface; remote HTTP providers and a local in-process model

#[cfg(test)]
mod tests;

pub mod local;
pub mod remote;

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{EmbeddingConfig, EmbeddingProvider, Secrets};
use crate::http::HttpError;

pub use local::{LocalEmbedder, LocalModel};
pub use remote::RemoteEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Cannot embed empty text")]
    EmptyInput,

    #[error("Embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding response is malformed: {0}")]
    MalformedResponse(String),

    #[error("Embedding request failed: {0}")]
    Upstream(#[from] HttpError),

    #[error("Missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Failed to load embedding model: {0}")]
    ModelLoad(String),
}

impl EmbeddingError {
    #[inline]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Upstream(HttpError::Timeout))
    }
}

/// Turns text into a fixed-length vector.
///
/// Every vector returned has exactly [`Embedder::dimension`] components.
/// Calls are blocking; async callers should use `spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Embed a query
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a document chunk at ingestion time. Providers that distinguish
    /// queries from documents override this.
    #[inline]
    fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text)
    }

    fn dimension(&self) -> usize;

    /// Provider and model, for logs
    fn describe(&self) -> String;
}

/// Reject blank input before any provider is called
#[inline]
pub fn require_text(text: &str) -> Result<&str, EmbeddingError> {
    if text.trim().is_empty() {
        Err(EmbeddingError::EmptyInput)
    } else {
        Ok(text)
    }
}

/// Check a provider's vector against the configured dimension
#[inline]
pub fn check_dimension(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::MalformedResponse(
            "provider returned an empty vector".to_string(),
        ));
    }
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Build the embedder selected by configuration
#[inline]
pub fn build_embedder(
    config: &EmbeddingConfig,
    secrets: &Secrets,
) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Local => Arc::new(local::from_config(config)?),
        provider => {
            let key = secrets
                .embedding_key(provider)
                .cloned()
                .ok_or_else(|| {
                    EmbeddingError::MissingApiKey(provider.api_key_var().unwrap_or("an API key"))
                })?;
            Arc::new(RemoteEmbedder::from_config(config, key)?)
        }
    };

    info!("Using embedder {} ({} dims)", embedder.describe(), embedder.dimension());
    Ok(embedder)
}
