//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] slides a character window of `chunk_size` over the
//!   text with stride `chunk_size - chunk_overlap`.
//! - [`RecursiveChunker`] splits on paragraph, line, and word separators
//!   before falling back to single characters, then merges the pieces into
//!   chunks of at most `chunk_size` characters.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separators tried by [`RecursiveChunker`], coarsest first.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Which [`Chunker`] a pipeline builds from its configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Exact character windows ([`FixedSizeChunker`]).
    #[default]
    Fixed,
    /// Separator-aware splitting ([`RecursiveChunker`]).
    Recursive,
}

impl ChunkStrategy {
    /// Build the chunker for this strategy.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the window parameters are invalid.
    pub fn build(self, chunk_size: usize, chunk_overlap: usize) -> Result<Arc<dyn Chunker>> {
        Ok(match self {
            Self::Fixed => Arc::new(FixedSizeChunker::new(chunk_size, chunk_overlap)?),
            Self::Recursive => Arc::new(RecursiveChunker::new(chunk_size, chunk_overlap)?),
        })
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("fixed"),
            Self::Recursive => f.write_str("recursive"),
        }
    }
}

/// A strategy for splitting documents into chunks.
///
/// Implementations must be deterministic: the same document always yields the
/// same chunk sequence, which keeps chunk IDs stable across re-ingestion.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

/// Validate window parameters.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] unless `chunk_size > 0` and
/// `chunk_overlap < chunk_size`.
pub fn validate_window(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Split `text` into overlapping character windows.
///
/// Each window holds at most `chunk_size` characters and starts
/// `chunk_size - chunk_overlap` characters after the previous one. The last
/// window ends at the end of the text and may be shorter. For a text of `L`
/// characters with `L > chunk_overlap` this yields
/// `ceil((L - chunk_overlap) / (chunk_size - chunk_overlap))` chunks; a
/// non-empty text no longer than the overlap yields a single chunk.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if the window parameters are invalid.
pub fn chunk_text(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate_window(chunk_size, chunk_overlap)?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let boundaries = char_boundaries(text);
    let char_count = boundaries.len() - 1;
    let step = chunk_size - chunk_overlap;

    let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
    let mut start = 0;
    let mut sequence_index = 0;

    loop {
        let end = (start + chunk_size).min(char_count);
        chunks.push(Chunk {
            id: Chunk::make_id(source_id, sequence_index),
            source_id: source_id.to_string(),
            sequence_index,
            text: text[boundaries[start]..boundaries[end]].to_string(),
            char_start: start,
            char_end: end,
        });

        if end == char_count {
            break;
        }
        sequence_index += 1;
        start += step;
    }

    Ok(chunks)
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document)?;
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        chunk_text(&document.id, &document.text, self.chunk_size, self.chunk_overlap)
    }
}

/// Splits text at natural boundaries, then merges pieces up to `chunk_size`.
///
/// Separators are tried in order; the first one present in a span splits it,
/// staying attached to the piece before it. Pieces still longer than
/// `chunk_size` are split again with the remaining separators, and the empty
/// separator splits into single characters. Consecutive pieces are then
/// merged greedily; each new chunk keeps a tail of at most `chunk_overlap`
/// characters from the previous one.
///
/// Chunks are contiguous slices of the text that together cover all of it.
/// No chunk exceeds `chunk_size` characters, and consecutive chunks share at
/// most `chunk_overlap` characters.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document)?;
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a `RecursiveChunker` using [`DEFAULT_SEPARATORS`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator list.
    ///
    /// Spans that no separator can split small enough fall back to single
    /// characters.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Upper bound on characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let text = document.text.as_str();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let splitter = Splitter {
            text,
            boundaries: char_boundaries(text),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        };
        let mut spans = Vec::new();
        splitter.split(0, splitter.char_count(), &self.separators, &mut spans);

        Ok(spans
            .into_iter()
            .enumerate()
            .map(|(sequence_index, (start, end))| Chunk {
                id: Chunk::make_id(&document.id, sequence_index),
                source_id: document.id.clone(),
                sequence_index,
                text: splitter.slice(start, end).to_string(),
                char_start: start,
                char_end: end,
            })
            .collect())
    }
}

/// Byte offset of every character, plus the end of the string.
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect()
}

/// Recursive splitting over character spans `(start, end)` of one text.
struct Splitter<'a> {
    text: &'a str,
    boundaries: Vec<usize>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter<'_> {
    fn char_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        &self.text[self.boundaries[start]..self.boundaries[end]]
    }

    /// Character index of a byte offset that lies on a character boundary.
    fn char_index(&self, byte: usize) -> usize {
        self.boundaries.binary_search(&byte).unwrap_or_else(|i| i)
    }

    fn split(
        &self,
        start: usize,
        end: usize,
        separators: &[String],
        out: &mut Vec<(usize, usize)>,
    ) {
        let span = self.slice(start, end);
        let (separator, rest) =
            match separators.iter().position(|s| s.is_empty() || span.contains(s.as_str())) {
                Some(i) => (separators[i].as_str(), &separators[i + 1..]),
                None => ("", &[][..]),
            };

        let mut pending = Vec::new();
        for (piece_start, piece_end) in self.pieces(start, end, separator) {
            if piece_end - piece_start <= self.chunk_size {
                pending.push((piece_start, piece_end));
            } else {
                self.merge(&pending, out);
                pending.clear();
                self.split(piece_start, piece_end, rest, out);
            }
        }
        self.merge(&pending, out);
    }

    /// Contiguous pieces of the span, each ending just after a separator.
    fn pieces(&self, start: usize, end: usize, separator: &str) -> Vec<(usize, usize)> {
        if separator.is_empty() {
            return (start..end).map(|i| (i, i + 1)).collect();
        }

        let base = self.boundaries[start];
        let mut pieces = Vec::new();
        let mut piece_start = start;
        for (offset, matched) in self.slice(start, end).match_indices(separator) {
            let piece_end = self.char_index(base + offset + matched.len());
            if piece_end > piece_start {
                pieces.push((piece_start, piece_end));
                piece_start = piece_end;
            }
        }
        if piece_start < end {
            pieces.push((piece_start, end));
        }
        pieces
    }

    /// Greedily merge consecutive pieces no longer than `chunk_size`.
    fn merge(&self, pieces: &[(usize, usize)], out: &mut Vec<(usize, usize)>) {
        let mut window: VecDeque<(usize, usize)> = VecDeque::new();
        let mut len = 0;

        for &(start, end) in pieces {
            let piece_len = end - start;
            if len + piece_len > self.chunk_size {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    out.push((first.0, last.1));
                }
                while len > self.chunk_overlap || (len > 0 && len + piece_len > self.chunk_size) {
                    match window.pop_front() {
                        Some((s, e)) => len -= e - s,
                        None => break,
                    }
                }
            }
            window.push_back((start, end));
            len += piece_len;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            out.push((first.0, last.1));
        }
    }
}
