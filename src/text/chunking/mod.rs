
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("whitespace pattern is valid"));
static PADDED_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?\n ?").expect("newline pattern is valid"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));

/// A contiguous span of source text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Stable identifier, unique within one document
    pub id: String,
    /// The chunk text (never empty)
    pub text: String,
    /// Offset of the first character within the normalized source text
    pub source_offset: Option<usize>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

/// Chunk size and overlap, both measured in characters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl SplitterConfig {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub const fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        Ok(())
    }
}

/// Collapse runs of spaces and tabs, strip spaces around line breaks,
/// squeeze blank lines to a single paragraph break and trim the ends
#[inline]
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = HORIZONTAL_WHITESPACE.replace_all(&text, " ");
    let text = PADDED_NEWLINE.replace_all(&text, "\n");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Split text into overlapping chunks.
///
/// Every chunk holds at most `chunk_size` characters, and each chunk starts
/// with exactly the last `chunk_overlap` characters of its predecessor.
/// Within those bounds a chunk ends at the latest paragraph break, line
/// break, sentence end or space it can find, falling back to a hard cut.
#[inline]
pub fn split(text: &str, config: &SplitterConfig) -> Result<Vec<Chunk>, ChunkingError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();

    if text.trim().is_empty() {
        return Ok(chunks);
    }

    let mut start = 0;
    loop {
        let hard_end = (start + config.chunk_size).min(total);
        let end = if hard_end == total {
            total
        } else {
            find_break(&chars, start + config.chunk_overlap + 1, hard_end)
        };

        chunks.push(Chunk {
            id: format!("chunk-{}", chunks.len()),
            text: chars[start..end].iter().collect(),
            source_offset: Some(start),
        });

        if end == total {
            break;
        }
        start = end - config.chunk_overlap;
    }

    debug!(
        "Split {} characters into {} chunks (size {}, overlap {})",
        total,
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}

/// Rebuild the source text by dropping the leading overlap of every chunk after the first
#[inline]
pub fn reconstruct(chunks: &[Chunk], chunk_overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(chunk_overlap));
        }
    }
    text
}

/// Pick the end (exclusive) of a chunk within `lowest..=highest`
fn find_break(chars: &[char], lowest: usize, highest: usize) -> usize {
    let paragraph = |end: usize| end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n';
    let line = |end: usize| chars[end - 1] == '\n';
    let sentence = |end: usize| {
        chars[end - 1].is_whitespace() && end >= 2 && matches!(chars[end - 2], '.' | '!' | '?')
    };
    let space = |end: usize| chars[end - 1].is_whitespace();

    let separators: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &line, &sentence, &space];
    separators
        .iter()
        .find_map(|is_break| (lowest..=highest).rev().find(|&end| is_break(end)))
        .unwrap_or(highest)
}
