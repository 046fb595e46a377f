
use anyhow::{Context, Result, bail};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, show_config};
use crate::embeddings::build_embedder;
use crate::generation::ChatCompletionGenerator;
use crate::ingest::{IngestOptions, Ingestor};
use crate::pipeline::QueryPipeline;
use crate::server;
use crate::store::{PineconeStore, StoreQueryError, VectorStore};

/// Overrides accepted by `docrag ingest`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOverrides {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub namespace: Option<String>,
}

impl IngestOverrides {
    /// Apply to `config` and re-validate
    #[inline]
    pub fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(size) = self.chunk_size {
            config.chunking.chunk_size = size;
        }
        if let Some(overlap) = self.chunk_overlap {
            config.chunking.chunk_overlap = overlap;
        }
        if let Some(namespace) = self.namespace {
            config.store.namespace = namespace;
        }
        config
            .validate()
            .context("Invalid ingestion settings")?;
        Ok(())
    }
}

/// Path of the configuration file in effect, if any
#[inline]
pub fn config_source(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => Config::default_config_path()
            .ok()
            .filter(|path| path.exists()),
    }
}

/// Pinecone client for the configured index
#[inline]
pub fn build_store(config: &Config) -> Result<Arc<PineconeStore>> {
    let key = config
        .secrets
        .pinecone
        .clone()
        .context("Missing API key: set PINECONE_API_KEY")?;
    let store = PineconeStore::from_config(&config.store, key)
        .context("Invalid vector store settings")?;
    Ok(Arc::new(store))
}

/// Embedder, store and generator wired into a query pipeline
#[inline]
pub fn build_pipeline(config: &Config) -> Result<QueryPipeline> {
    let embedder = build_embedder(&config.embedding, &config.secrets)
        .context("Failed to set up the embedding provider")?;
    let store = build_store(config)?;
    let key = config
        .secrets
        .segmind
        .clone()
        .context("Missing API key: set SEGMIND_API_KEY")?;
    let generator = ChatCompletionGenerator::from_config(&config.generation, key)
        .context("Invalid generation settings")?;

    Ok(QueryPipeline::new(
        embedder,
        store,
        Arc::new(generator),
        config.store.index.clone(),
        config.store.namespace.clone(),
    )
    .with_top_k(config.store.top_k))
}

/// Refuse to serve against a collection built with another embedding model.
/// A collection that does not exist yet only warrants a warning.
#[inline]
pub fn check_collection(store: &dyn VectorStore, collection: &str, dimension: usize) -> Result<()> {
    match store.stats(collection) {
        Ok(stats) if stats.dimension != dimension => bail!(
            "Collection '{}' has dimension {}, but the embedder produces {}; \
             re-ingest into a new collection or switch providers",
            collection,
            stats.dimension,
            dimension
        ),
        Ok(stats) => {
            info!(
                "Collection '{}' ready: {} records, dimension {}",
                collection, stats.total_records, stats.dimension
            );
            Ok(())
        }
        Err(StoreQueryError::CollectionNotFound(_)) => {
            warn!(
                "Collection '{}' does not exist yet; queries will fail until a document is ingested",
                collection
            );
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to describe collection '{}'", collection)),
    }
}

/// Ingest one document into the configured collection
#[inline]
pub async fn ingest_document(
    mut config: Config,
    path: &Path,
    overrides: IngestOverrides,
) -> Result<()> {
    overrides.apply(&mut config)?;

    let embedder = build_embedder(&config.embedding, &config.secrets)
        .context("Failed to set up the embedding provider")?;
    let store = build_store(&config)?;
    let ingestor = Ingestor::new(embedder, store, IngestOptions::from_config(&config));

    let report = ingestor
        .ingest_path(path)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;

    println!(
        "{} {}",
        style("Ingested").bold().green(),
        style(&report.source).cyan()
    );
    println!("  Chunks: {}", style(report.chunks).cyan());
    println!("  Written: {}", style(report.written).cyan());
    if !report.skipped.is_empty() {
        println!("  Skipped: {}", style(report.skipped.len()).yellow());
        for skipped in &report.skipped {
            println!("    {}: {}", skipped.chunk_id, style(&skipped.reason).dim());
        }
    }
    println!(
        "  Collection: {} / {}",
        style(&config.store.index).cyan(),
        style(&config.store.namespace).cyan()
    );
    println!("  Duration: {:.2?}", report.duration);

    Ok(())
}

/// Start the HTTP server
#[inline]
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate().context("Invalid server settings")?;

    let pipeline = build_pipeline(&config)?;
    let store = build_store(&config)?;
    let collection = config.store.index.clone();
    let dimension = pipeline.embedder().dimension();

    tokio::task::spawn_blocking(move || check_collection(store.as_ref(), &collection, dimension))
        .await
        .context("Start-up check task failed")??;

    server::run(&config.server, pipeline)
        .await
        .context("Server failed")?;
    Ok(())
}

/// Answer one query from the terminal
#[inline]
pub async fn ask(config: &Config, query: String) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let answer = tokio::task::spawn_blocking(move || pipeline.run(&query))
        .await
        .context("Query task failed")??;

    println!("{}", answer.text);

    if !answer.matches.is_empty() {
        println!();
        println!("{}", style("Sources:").bold().yellow());
        for record in &answer.matches {
            let source = record
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.source.as_deref())
                .unwrap_or("unknown");
            println!(
                "  {} {} {}",
                style(format!("{:.4}", record.score)).dim(),
                style(&record.id).cyan(),
                source
            );
        }
    }

    Ok(())
}

/// Describe the configured collection
#[inline]
pub async fn show_stats(config: &Config) -> Result<()> {
    let store = build_store(config)?;
    let collection = config.store.index.clone();

    let stats = tokio::task::spawn_blocking(move || store.stats(&collection))
        .await
        .context("Stats task failed")?
        .with_context(|| format!("Failed to describe collection '{}'", config.store.index))?;

    println!(
        "{} {}",
        style("Collection").bold().cyan(),
        style(&config.store.index).bold()
    );
    println!("  Dimension: {}", style(stats.dimension).cyan());
    println!("  Total records: {}", style(stats.total_records).cyan());
    if stats.namespaces.is_empty() {
        println!("  {}", style("No namespaces").dim());
    } else {
        println!("  Namespaces:");
        for (namespace, count) in &stats.namespaces {
            println!("    {}: {}", namespace, style(count).cyan());
        }
    }

    Ok(())
}

/// Print the effective configuration
#[inline]
pub fn print_config(config: &Config, explicit: Option<&Path>) {
    show_config(config, config_source(explicit).as_deref());
}
