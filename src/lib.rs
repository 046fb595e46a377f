use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] text::ExtractionError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] text::ChunkingError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] embeddings::EmbeddingError),

    #[error("Vector store configuration error: {0}")]
    StoreConfig(#[from] store::StoreConfigError),

    #[error("Vector store write error: {0}")]
    StoreWrite(#[from] store::StoreWriteError),

    #[error("Vector store query error: {0}")]
    StoreQuery(#[from] store::StoreQueryError),

    #[error("Generation error: {0}")]
    Generation(#[from] generation::GenerationError),

    #[error("Query failed: {0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] ingest::IngestError),

    #[error("Server error: {0}")]
    Server(#[from] server::ServerError),

    #[error("Network error: {0}")]
    Http(#[from] http::HttpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod text;
