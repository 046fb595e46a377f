// Ingestion path: extract -> split -> ensure collection -> embed -> upsert
// Embedding runs on blocking threads, `concurrency` chunks at a time.


use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::store::{
    CollectionSpec, Metric, RecordMetadata, StoreConfigError, StoreWriteError, VectorRecord,
    VectorStore,
};
use crate::text::{self, Chunk, ChunkingError, ExtractionError, SplitterConfig};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error("Document {0} contains no text")]
    NoContent(String),

    #[error(transparent)]
    Collection(#[from] StoreConfigError),

    #[error("Failed to embed {chunk_id}: {source}")]
    Embedding {
        chunk_id: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("Every chunk failed to embed ({0} chunks)")]
    NothingEmbedded(usize),

    #[error(transparent)]
    Write(#[from] StoreWriteError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Where and how chunks are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub collection: String,
    pub namespace: String,
    pub metric: Metric,
    pub splitter: SplitterConfig,
    pub concurrency: usize,
    /// Drop chunks whose embedding fails instead of aborting
    pub skip_failed_embeddings: bool,
}

impl IngestOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.store.index.clone(),
            namespace: config.store.namespace.clone(),
            metric: config.store.metric,
            splitter: config.chunking,
            concurrency: config.ingest.concurrency,
            skip_failed_embeddings: config.ingest.skip_failed_embeddings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChunk {
    pub chunk_id: String,
    pub reason: String,
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    pub chunks: usize,
    pub written: usize,
    pub skipped: Vec<SkippedChunk>,
    pub duration: Duration,
}

#[derive(Clone)]
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    options: IngestOptions,
    show_progress: bool,
}

impl Ingestor {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        options: IngestOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            options,
            show_progress: console::user_attended_stderr(),
        }
    }

    #[inline]
    pub const fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[inline]
    pub const fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Ingest one document file
    #[inline]
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let source = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());

        info!("Extracting text from {}", path.display());
        let owned: PathBuf = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || text::extract(&owned))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))??;

        self.ingest_text(&document, &source).await
    }

    /// Ingest already-extracted text, labelled with `source` in metadata
    #[inline]
    pub async fn ingest_text(&self, document: &str, source: &str) -> Result<IngestReport, IngestError> {
        let started = Instant::now();

        let document = text::normalize_whitespace(document);
        let chunks: Vec<Chunk> = text::split(&document, &self.options.splitter)?
            .into_iter()
            .filter(|chunk| !chunk.text.trim().is_empty())
            .collect();
        if chunks.is_empty() {
            return Err(IngestError::NoContent(source.to_string()));
        }
        info!(
            "Split {} into {} chunks (size {}, overlap {})",
            source,
            chunks.len(),
            self.options.splitter.chunk_size,
            self.options.splitter.chunk_overlap
        );

        let spec = CollectionSpec::new(
            self.options.collection.clone(),
            self.embedder.dimension(),
            self.options.metric,
        );
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.ensure_collection(&spec))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))??;

        let total = chunks.len();
        let (records, skipped) = self.embed_chunks(chunks, source).await?;
        if records.is_empty() {
            return Err(IngestError::NothingEmbedded(total));
        }

        let store = Arc::clone(&self.store);
        let collection = self.options.collection.clone();
        let namespace = self.options.namespace.clone();
        let written =
            tokio::task::spawn_blocking(move || store.upsert(&collection, &namespace, &records))
                .await
                .map_err(|e| IngestError::Task(e.to_string()))??;

        let report = IngestReport {
            source: source.to_string(),
            chunks: total,
            written,
            skipped,
            duration: started.elapsed(),
        };
        info!(
            "Ingested {}: {} records written, {} skipped in {:.1}s",
            report.source,
            report.written,
            report.skipped.len(),
            report.duration.as_secs_f32()
        );
        Ok(report)
    }

    async fn embed_chunks(
        &self,
        chunks: Vec<Chunk>,
        source: &str,
    ) -> Result<(Vec<VectorRecord>, Vec<SkippedChunk>), IngestError> {
        let bar = if self.show_progress {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(source.to_string());

        let ingested_at = chrono::Utc::now().to_rfc3339();
        let mut results = stream::iter(chunks)
            .map(|chunk| {
                let embedder = Arc::clone(&self.embedder);
                tokio::task::spawn_blocking(move || {
                    let vector = embedder.embed_document(&chunk.text);
                    (chunk, vector)
                })
            })
            .buffered(self.options.concurrency.max(1));

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        while let Some(joined) = results.next().await {
            let (chunk, vector) = joined.map_err(|e| IngestError::Task(e.to_string()))?;
            bar.inc(1);

            match vector {
                Ok(vector) => {
                    debug!("Embedded {} ({} dims)", chunk.id, vector.len());
                    records.push(VectorRecord {
                        id: chunk.id,
                        vector,
                        metadata: RecordMetadata {
                            text: chunk.text,
                            source: Some(source.to_string()),
                            ingested_at: Some(ingested_at.clone()),
                        },
                    });
                }
                Err(e @ EmbeddingError::DimensionMismatch { .. }) => {
                    bar.abandon();
                    return Err(IngestError::Embedding {
                        chunk_id: chunk.id,
                        source: e,
                    });
                }
                Err(e) if self.options.skip_failed_embeddings => {
                    warn!("Skipping {}: {}", chunk.id, e);
                    skipped.push(SkippedChunk {
                        chunk_id: chunk.id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    bar.abandon();
                    return Err(IngestError::Embedding {
                        chunk_id: chunk.id,
                        source: e,
                    });
                }
            }
        }

        bar.finish_and_clear();
        Ok((records, skipped))
    }
}
