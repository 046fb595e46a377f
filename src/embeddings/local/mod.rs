//! In-process embedding model.
//!
//! The model is loaded on the first call to [`Embedder::embed`], so that call
//! can take seconds (weights may also be downloaded). The loaded instance is
//! kept for the lifetime of the embedder and dropped with it. Concurrent first
//! callers wait on the same load instead of starting their own.


use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

use super::{Embedder, EmbeddingError, check_dimension, require_text};
use crate::config::EmbeddingConfig;

/// A loaded model able to embed one text at a time
pub trait LocalModel: Send {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

type Loader<M> = Box<dyn Fn() -> Result<M, EmbeddingError> + Send + Sync>;

/// Lazily-initialized local model behind the [`Embedder`] interface
pub struct LocalEmbedder<M: LocalModel> {
    model_name: String,
    dimension: usize,
    loader: Loader<M>,
    model: Mutex<Option<M>>,
}

impl<M: LocalModel> fmt::Debug for LocalEmbedder<M> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl<M: LocalModel> LocalEmbedder<M> {
    #[inline]
    pub fn new<F>(model_name: impl Into<String>, dimension: usize, loader: F) -> Self
    where
        F: Fn() -> Result<M, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            model_name: model_name.into(),
            dimension,
            loader: Box::new(loader),
            model: Mutex::new(None),
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Load the model now instead of on first use
    #[inline]
    pub fn warm_up(&self) -> Result<(), EmbeddingError> {
        let mut guard = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_into(&mut guard)?;
        Ok(())
    }

    fn load_into<'a>(&self, slot: &'a mut Option<M>) -> Result<&'a mut M, EmbeddingError> {
        if slot.is_none() {
            info!("Loading local embedding model {}", self.model_name);
            let started = Instant::now();
            let model = (self.loader)()?;
            info!(
                "Loaded {} in {:.1}s",
                self.model_name,
                started.elapsed().as_secs_f32()
            );
            *slot = Some(model);
        }
        slot.as_mut()
            .ok_or_else(|| EmbeddingError::ModelLoad(self.model_name.clone()))
    }
}

impl<M: LocalModel> Embedder for LocalEmbedder<M> {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = require_text(text)?;
        let mut guard = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        let model = self.load_into(&mut guard)?;

        debug!("Embedding text locally (length: {})", text.len());
        let vector = model.embed(text)?;
        drop(guard);

        check_dimension(vector, self.dimension)
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn describe(&self) -> String {
        format!("local/{}", self.model_name)
    }
}

#[cfg(feature = "local-embeddings")]
mod fast {
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::{EmbeddingError, LocalModel};

    impl LocalModel for TextEmbedding {
        fn embed(&mut self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            TextEmbedding::embed(self, vec![text], None)
                .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::MalformedResponse("model returned no embedding".to_string()))
        }
    }

    pub(super) fn model_for(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
        match name.to_ascii_lowercase().as_str() {
            "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
                Ok(EmbeddingModel::AllMiniLML6V2)
            }
            other => Err(EmbeddingError::ProviderUnavailable(format!(
                "unsupported local model: {other}"
            ))),
        }
    }

    pub(super) fn load(model: EmbeddingModel) -> Result<TextEmbedding, EmbeddingError> {
        TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))
    }
}

/// The configured local embedder
#[cfg(feature = "local-embeddings")]
#[inline]
pub fn from_config(
    config: &EmbeddingConfig,
) -> Result<LocalEmbedder<fastembed::TextEmbedding>, EmbeddingError> {
    let name = config.model().unwrap_or_else(|| "bge-base-en-v1.5".to_string());
    let model = fast::model_for(&name)?;
    Ok(LocalEmbedder::new(name, config.dimension(), move || {
        fast::load(model.clone())
    }))
}

/// Without the `local-embeddings` feature there is no model to load
#[cfg(not(feature = "local-embeddings"))]
#[inline]
pub fn from_config(config: &EmbeddingConfig) -> Result<LocalEmbedder<Unavailable>, EmbeddingError> {
    Err(EmbeddingError::ProviderUnavailable(format!(
        "local model {} requires building with the `local-embeddings` feature; \
         set EMBEDDING_PROVIDER to openai, segmind, cohere or huggingface to use a remote provider",
        config.model().unwrap_or_default()
    )))
}

/// Placeholder model type for builds without a local backend
#[cfg(not(feature = "local-embeddings"))]
#[derive(Debug)]
pub enum Unavailable {}

#[cfg(not(feature = "local-embeddings"))]
impl LocalModel for Unavailable {
    #[inline]
    fn embed(&mut self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match *self {}
    }
}
