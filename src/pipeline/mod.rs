//! Query path: embed the question, retrieve context, generate an answer.
//!
//! A run is an explicit sequence of [`QueryState`]s driven by
//! [`QueryPipeline::advance`]:
//!
//! ```text
//! Idle -> Embedding -> Retrieving -> Generating -> Responding
//! ```
//!
//! Any step may fail instead, with a [`PipelineError`] naming the stage.


use itertools::Itertools;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::embeddings::{Embedder, EmbeddingError};
use crate::generation::{AnswerGenerator, GenerationError};
use crate::store::{ScoredRecord, StoreQueryError, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Embedding,
    Retrieving,
    Generating,
    Responding,
}

impl Stage {
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
            Self::Responding => "responding",
        }
    }
}

impl fmt::Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[source] EmbeddingError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] StoreQueryError),

    #[error("Generation failed: {0}")]
    Generation(#[source] GenerationError),
}

impl PipelineError {
    /// Stage the run was in when it failed
    #[inline]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::BadRequest(_) => Stage::Idle,
            Self::Embedding(_) => Stage::Embedding,
            Self::Retrieval(_) => Stage::Retrieving,
            Self::Generation(_) => Stage::Generating,
        }
    }

    #[inline]
    pub const fn is_timeout(&self) -> bool {
        match self {
            Self::BadRequest(_) => false,
            Self::Embedding(e) => e.is_timeout(),
            Self::Retrieval(e) => e.is_timeout(),
            Self::Generation(e) => e.is_timeout(),
        }
    }

    /// The caller's fault rather than an upstream one
    #[inline]
    pub const fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Context handed to the generator
    pub context: String,
    /// Retrieved records, best first
    pub matches: Vec<ScoredRecord>,
}

/// Where a run currently is, with everything the next step needs
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
    Idle {
        query: String,
    },
    Embedding {
        query: String,
    },
    Retrieving {
        query: String,
        vector: Vec<f32>,
    },
    Generating {
        query: String,
        matches: Vec<ScoredRecord>,
        context: String,
    },
    Responding(Answer),
}

impl QueryState {
    #[inline]
    pub fn new(query: impl Into<String>) -> Self {
        Self::Idle {
            query: query.into(),
        }
    }

    #[inline]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Idle { .. } => Stage::Idle,
            Self::Embedding { .. } => Stage::Embedding,
            Self::Retrieving { .. } => Stage::Retrieving,
            Self::Generating { .. } => Stage::Generating,
            Self::Responding(_) => Stage::Responding,
        }
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Responding(_))
    }
}

/// Newline-joined texts of the matches, in the order given
#[inline]
pub fn build_context(matches: &[ScoredRecord]) -> String {
    matches
        .iter()
        .filter_map(|m| m.metadata.as_ref())
        .map(|metadata| metadata.text.as_str())
        .join("\n")
}

/// Composes an embedder, a vector store and a generator into the query path
#[derive(Clone)]
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn AnswerGenerator>,
    collection: String,
    namespace: String,
    top_k: usize,
}

impl fmt::Debug for QueryPipeline {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("embedder", &self.embedder.describe())
            .field("collection", &self.collection)
            .field("namespace", &self.namespace)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl QueryPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn AnswerGenerator>,
        collection: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            collection: collection.into(),
            namespace: namespace.into(),
            top_k: 5,
        }
    }

    #[inline]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Perform one transition. A terminal state is returned unchanged.
    #[inline]
    pub fn advance(&self, state: QueryState) -> Result<QueryState, PipelineError> {
        let next = match state {
            QueryState::Idle { query } => {
                let query = query.trim();
                if query.is_empty() {
                    return Err(PipelineError::BadRequest("Query is required".to_string()));
                }
                QueryState::Embedding {
                    query: query.to_string(),
                }
            }
            QueryState::Embedding { query } => {
                let vector = self.embedder.embed(&query).map_err(PipelineError::Embedding)?;
                QueryState::Retrieving { query, vector }
            }
            QueryState::Retrieving { query, vector } => {
                let matches = self
                    .store
                    .query(&self.collection, &self.namespace, &vector, self.top_k)
                    .map_err(PipelineError::Retrieval)?;
                let context = build_context(&matches);
                debug!(
                    "Retrieved {} matches ({} context chars)",
                    matches.len(),
                    context.len()
                );
                QueryState::Generating {
                    query,
                    matches,
                    context,
                }
            }
            QueryState::Generating {
                query,
                matches,
                context,
            } => {
                let text = self
                    .generator
                    .generate(&query, &context)
                    .map_err(PipelineError::Generation)?;
                QueryState::Responding(Answer {
                    text,
                    context,
                    matches,
                })
            }
            responding @ QueryState::Responding(_) => return Ok(responding),
        };

        debug!("Query pipeline entered {}", next.stage());
        Ok(next)
    }

    /// Drive a query from `Idle` to `Responding`
    #[inline]
    pub fn run(&self, query: &str) -> Result<Answer, PipelineError> {
        let mut state = QueryState::new(query);
        loop {
            state = self.advance(state).inspect_err(|e| {
                if e.is_bad_request() {
                    debug!("Rejected query: {}", e);
                } else {
                    error!(stage = %e.stage(), "Query pipeline failed: {}", e);
                }
            })?;

            if let QueryState::Responding(answer) = state {
                return Ok(answer);
            }
        }
    }
}
