// Vector store abstraction
// Collections are typed by dimension and metric; records are upserted by id

#[cfg(test)]
mod tests;

pub mod memory;
pub mod pinecone;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::http::HttpError;

pub use memory::MemoryStore;
pub use pinecone::PineconeStore;

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Metric {
    #[serde(rename = "cosine")]
    Cosine,
    #[serde(rename = "dotproduct")]
    DotProduct,
    #[serde(rename = "euclidean")]
    Euclidean,
}

impl Metric {
    /// Score `candidate` against `query`.
    /// Cosine and dot product grow with similarity; Euclidean is the squared
    /// distance and shrinks with similarity.
    #[inline]
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Self::DotProduct => dot(query, candidate),
            Self::Cosine => {
                let norms = dot(query, query).sqrt() * dot(candidate, candidate).sqrt();
                if norms == 0.0 {
                    0.0
                } else {
                    dot(query, candidate) / norms
                }
            }
            Self::Euclidean => query
                .iter()
                .zip(candidate)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
        }
    }

    /// Order two scores best first. NaN ranks after every real score.
    #[inline]
    pub fn rank(self, a: f32, b: f32) -> Ordering {
        let worst = match self {
            Self::Cosine | Self::DotProduct => f32::NEG_INFINITY,
            Self::Euclidean => f32::INFINITY,
        };
        let key = |score: f32| if score.is_nan() { worst } else { score };
        match self {
            Self::Cosine | Self::DotProduct => key(b).total_cmp(&key(a)),
            Self::Euclidean => key(a).total_cmp(&key(b)),
        }
    }

    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dotproduct",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for Metric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Desired shape of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

impl CollectionSpec {
    #[inline]
    pub fn new(name: impl Into<String>, dimension: usize, metric: Metric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
        }
    }
}

/// Metadata stored alongside each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordMetadata {
    /// The chunk text
    pub text: String,
    /// Source document the chunk came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// RFC 3339 timestamp of ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<String>,
}

impl RecordMetadata {
    #[inline]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            ingested_at: None,
        }
    }
}

/// The persisted unit: one per chunk
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A nearest-neighbor match
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    /// Absent when the stored record carries no readable text
    pub metadata: Option<RecordMetadata>,
}

/// Summary of a collection's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub dimension: usize,
    pub total_records: usize,
    pub namespaces: BTreeMap<String, usize>,
}

#[derive(Debug, Error)]
pub enum StoreConfigError {
    #[error(
        "Collection '{name}' exists with dimension {existing}, requested {requested}; \
         create a new collection when switching embedding providers"
    )]
    DimensionMismatch {
        name: String,
        existing: usize,
        requested: usize,
    },
    #[error("Collection '{name}' exists with metric {existing}, requested {requested}")]
    MetricMismatch {
        name: String,
        existing: Metric,
        requested: Metric,
    },
    #[error("Collection '{0}' did not become ready in time")]
    NotReady(String),
    #[error("Invalid collection settings: {0}")]
    Invalid(String),
    #[error("Vector store request failed: {0}")]
    Upstream(#[from] HttpError),
}

#[derive(Debug, Error)]
pub enum StoreWriteError {
    #[error("Record '{id}' has dimension {actual}, collection expects {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),
    #[error("Vector store write failed: {0}")]
    Upstream(#[from] HttpError),
}

#[derive(Debug, Error)]
pub enum StoreQueryError {
    #[error("top_k must be a positive integer")]
    InvalidTopK,
    #[error("Query vector has dimension {actual}, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),
    #[error("Vector store query failed: {0}")]
    Upstream(#[from] HttpError),
}

impl StoreQueryError {
    #[inline]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Upstream(HttpError::Timeout))
    }
}

/// A remote or in-process vector database.
///
/// Calls are blocking and never retried here beyond the HTTP layer's policy.
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent; fail if it exists with another shape
    fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreConfigError>;

    /// Insert or replace records by id.
    ///
    /// Every vector is checked before anything is written: one bad record
    /// rejects the whole batch. Returns the number of records written.
    fn upsert(
        &self,
        collection: &str,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<usize, StoreWriteError>;

    /// The `top_k` nearest records, best first. Returns fewer when the
    /// namespace holds fewer records.
    fn query(
        &self,
        collection: &str,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreQueryError>;

    /// Record counts and dimension of a collection
    fn stats(&self, collection: &str) -> Result<CollectionStats, StoreQueryError>;
}

/// Check every record against the collection dimension
#[inline]
pub fn validate_records(records: &[VectorRecord], dimension: usize) -> Result<(), StoreWriteError> {
    match records.iter().find(|record| record.vector.len() != dimension) {
        Some(record) => Err(StoreWriteError::DimensionMismatch {
            id: record.id.clone(),
            expected: dimension,
            actual: record.vector.len(),
        }),
        None => Ok(()),
    }
}
