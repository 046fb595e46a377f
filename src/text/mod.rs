// Text preparation: document extraction and chunking

pub mod chunking;
pub mod extract;

pub use chunking::{Chunk, ChunkingError, SplitterConfig, normalize_whitespace, reconstruct, split};
pub use extract::{DocumentFormat, ExtractionError, extract};
