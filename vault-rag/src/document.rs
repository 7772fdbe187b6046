//! Data types for documents, chunks, stored records, and search results.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The source format a [`Document`] was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format (`.pdf`).
    Pdf,
    /// Microsoft Word (`.docx`).
    Docx,
    /// EPUB ebook (`.epub`).
    Epub,
    /// Plain text (`.txt`).
    Text,
    /// Markdown (`.md`).
    Markdown,
}

impl DocumentFormat {
    /// Every supported format.
    pub const ALL: [DocumentFormat; 5] =
        [Self::Pdf, Self::Docx, Self::Epub, Self::Text, Self::Markdown];

    /// Resolve a format from a file extension, without the leading dot.
    ///
    /// Matching is case-insensitive.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "epub" => Some(Self::Epub),
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Resolve a format from the extension of a path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }

    /// The canonical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Epub => "epub",
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A unit of ingestion: extracted text plus source metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable source identifier, usually the absolute file path.
    pub id: String,
    /// The extracted text content of the document.
    pub text: String,
    /// The format the text was extracted from.
    pub format: DocumentFormat,
    /// When the document was loaded.
    pub ingested_at: DateTime<Utc>,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document stamped with the current time and no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>, format: DocumentFormat) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            format,
            ingested_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous slice of a [`Document`]'s text.
///
/// Offsets count Unicode scalar values, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic identifier, `{source_id}_{sequence_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub source_id: String,
    /// Position of this chunk within its document.
    pub sequence_index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Offset of the first character, inclusive.
    pub char_start: usize,
    /// Offset one past the last character.
    pub char_end: usize,
}

impl Chunk {
    /// Build the deterministic chunk ID for a source and position.
    ///
    /// The sequence index is always the suffix after the last `_`, so two
    /// distinct `(source_id, sequence_index)` pairs never share an ID.
    pub fn make_id(source_id: &str, sequence_index: usize) -> String {
        format!("{source_id}_{sequence_index}")
    }
}

/// A persisted chunk with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    /// Unique key across the collection.
    pub chunk_id: String,
    /// The vector embedding for the chunk text.
    pub embedding: Vec<f32>,
    /// The chunk text.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub source_id: String,
    /// Position of the chunk within its document.
    pub sequence_index: usize,
}

impl StoredRecord {
    /// Pair a chunk with the embedding computed for its text.
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id,
            embedding,
            text: chunk.text,
            source_id: chunk.source_id,
            sequence_index: chunk.sequence_index,
        }
    }
}

/// A retrieved record paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The ID of the matching record.
    pub chunk_id: String,
    /// The chunk text.
    pub text: String,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
    /// The ID of the parent [`Document`].
    pub source_id: String,
    /// Position of the chunk within its document.
    pub sequence_index: usize,
}

/// Optional constraints applied to a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Only return records from this source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Drop results scoring below this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl SearchFilter {
    /// Restrict results to one source.
    pub fn source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Drop results scoring below `threshold`.
    pub fn min_score(mut self, threshold: f32) -> Self {
        self.min_score = Some(threshold);
        self
    }

    /// Returns `true` if a record from `source_id` with `score` passes the filter.
    pub fn accepts(&self, source_id: &str, score: f32) -> bool {
        let source_ok = self.source_id.as_deref().is_none_or(|wanted| wanted == source_id);
        let score_ok = self.min_score.is_none_or(|threshold| score >= threshold);
        source_ok && score_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_path_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/B.PDF")), Some(DocumentFormat::Pdf));
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.md")),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("archive.zip")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn filter_checks_source_and_score() {
        let filter = SearchFilter::default().source("a.txt").min_score(0.5);
        assert!(filter.accepts("a.txt", 0.5));
        assert!(!filter.accepts("a.txt", 0.49));
        assert!(!filter.accepts("b.txt", 0.9));
        assert!(SearchFilter::default().accepts("anything", -1.0));
    }
}
