//! Document loading.
//!
//! The pipeline depends only on the [`DocumentLoader`] trait. Plain text and
//! Markdown are handled by [`TextLoader`]; binary formats (PDF, DOCX, EPUB)
//! need an external extractor registered with [`LoaderRegistry::register`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{Document, DocumentFormat};
use crate::error::{RagError, Result};

/// Extracts plain text from a file of one or more formats.
pub trait DocumentLoader: Send + Sync {
    /// The formats this loader understands.
    fn formats(&self) -> &[DocumentFormat];

    /// Read `path` and return its text content.
    fn load(&self, path: &Path) -> Result<String>;
}

/// Loader for `.txt` and `.md` files.
///
/// Decodes UTF-8, falling back to Latin-1 for files that are not valid UTF-8.
/// A leading byte order mark is removed and line endings are normalized to `\n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl TextLoader {
    const FORMATS: [DocumentFormat; 2] = [DocumentFormat::Text, DocumentFormat::Markdown];
}

impl DocumentLoader for TextLoader {
    fn formats(&self) -> &[DocumentFormat] {
        &Self::FORMATS
    }

    fn load(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(decode_text(bytes))
    }
}

fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        // Every byte is a valid Latin-1 code point.
        Err(e) => e.into_bytes().iter().map(|&b| char::from(b)).collect(),
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Dispatches file loading by [`DocumentFormat`].
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<DocumentFormat, Arc<dyn DocumentLoader>>,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<_> = self.loaders.keys().map(|f| f.extension()).collect();
        formats.sort_unstable();
        f.debug_struct("LoaderRegistry").field("formats", &formats).finish()
    }
}

impl LoaderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with [`TextLoader`] registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextLoader));
        registry
    }

    /// Register `loader` for every format it reports, replacing earlier ones.
    pub fn register(&mut self, loader: Arc<dyn DocumentLoader>) {
        for format in loader.formats() {
            self.loaders.insert(*format, Arc::clone(&loader));
        }
    }

    /// Whether a loader is registered for `format`.
    pub fn supports(&self, format: DocumentFormat) -> bool {
        self.loaders.contains_key(&format)
    }

    /// Load one file into a [`Document`] identified by its absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentLoadError`] if the file is missing, its
    /// extension is not recognised, no loader handles its format, or the
    /// loader fails.
    pub fn load_document(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let load_error = |message: String| RagError::DocumentLoadError {
            path: path.display().to_string(),
            message,
        };

        let canonical = path.canonicalize().map_err(|e| load_error(e.to_string()))?;
        let format = DocumentFormat::from_path(&canonical)
            .ok_or_else(|| load_error("unsupported file extension".to_string()))?;
        let loader = self
            .loaders
            .get(&format)
            .ok_or_else(|| load_error(format!("no loader registered for .{format} files")))?;

        let text = loader.load(&canonical).map_err(|e| load_error(e.to_string()))?;
        let size_bytes = std::fs::metadata(&canonical).map(|m| m.len()).unwrap_or(0);

        debug!(
            path = %canonical.display(),
            %format,
            chars = text.chars().count(),
            "loaded document"
        );
        Ok(Document::new(canonical.display().to_string(), text, format)
            .with_metadata("size_bytes", size_bytes.to_string()))
    }

    /// Load every supported file under `dir`.
    ///
    /// Hidden files and files with unsupported extensions are skipped. Files
    /// that fail to load are logged and skipped. Documents are returned
    /// sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentLoadError`] if `dir` is not a directory.
    pub fn load_directory(&self, dir: impl AsRef<Path>, recursive: bool) -> Result<Vec<Document>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RagError::DocumentLoadError {
                path: dir.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(dir).min_depth(1).max_depth(max_depth);
        let mut documents = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_hidden(&entry) {
                continue;
            }
            let supported =
                DocumentFormat::from_path(entry.path()).is_some_and(|format| self.supports(format));
            if !supported {
                debug!(path = %entry.path().display(), "skipping unsupported file");
                continue;
            }
            match self.load_document(entry.path()) {
                Ok(document) => documents.push(document),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping file"),
            }
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        info!(dir = %dir.display(), document_count = documents.len(), "loaded directory");
        Ok(documents)
    }
}

/// Hidden files are skipped; hidden directories are still walked.
fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_latin1_and_normalizes_newlines() {
        assert_eq!(decode_text(b"caf\xe9\r\nbar\rbaz".to_vec()), "café\nbar\nbaz");
        assert_eq!(decode_text("\u{feff}hello\r\n".as_bytes().to_vec()), "hello\n");
    }

    #[test]
    fn default_registry_supports_text_formats_only() {
        let registry = LoaderRegistry::with_defaults();
        assert!(registry.supports(DocumentFormat::Text));
        assert!(registry.supports(DocumentFormat::Markdown));
        assert!(!registry.supports(DocumentFormat::Pdf));
    }
}
