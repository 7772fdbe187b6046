//! Tests for document loading and directory discovery.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use vault_rag::{
    DocumentFormat, DocumentLoader, ErrorKind, LoaderRegistry, RagError, Result,
};

/// Stands in for an external PDF text extractor.
struct FakePdfLoader;

impl DocumentLoader for FakePdfLoader {
    fn formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Pdf]
    }

    fn load(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)?;
        if bytes.starts_with(b"%PDF") {
            Ok("extracted pdf text".to_string())
        } else {
            Err(RagError::ValidationError("not a PDF".to_string()))
        }
    }
}

fn write(dir: &Path, name: &str, contents: &[u8]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn file_names(ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| Path::new(id).file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn loads_text_with_metadata() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "lecture.md", b"# Title\r\nBody\r\n");

    let doc = LoaderRegistry::with_defaults().load_document(dir.path().join("lecture.md")).unwrap();
    assert_eq!(doc.text, "# Title\nBody\n");
    assert_eq!(doc.format, DocumentFormat::Markdown);
    assert!(Path::new(&doc.id).is_absolute());
    assert_eq!(doc.metadata.get("size_bytes").map(String::as_str), Some("15"));
}

#[test]
fn load_failures_are_load_errors() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "scan.pdf", b"%PDF-1.7");
    write(dir.path(), "data.csv", b"a,b");
    let registry = LoaderRegistry::with_defaults();

    for name in ["missing.txt", "scan.pdf", "data.csv"] {
        let err = registry.load_document(dir.path().join(name)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load, "{name}");
        assert!(matches!(err, RagError::DocumentLoadError { .. }));
    }
}

#[test]
fn directory_walk_skips_hidden_files_and_unsupported_formats() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "b.txt", b"second");
    write(dir.path(), "a.md", b"first");
    write(dir.path(), ".hidden.txt", b"secret");
    write(dir.path(), ".notes/inner.txt", b"inside a hidden directory");
    write(dir.path(), ".notes/.draft.txt", b"hidden file in hidden directory");
    write(dir.path(), "image.png", b"\x89PNG");
    write(dir.path(), "scan.pdf", b"%PDF-1.7");
    write(dir.path(), "sub/c.txt", b"nested");

    let registry = LoaderRegistry::with_defaults();
    let flat = registry.load_directory(dir.path(), false).unwrap();
    let ids: Vec<String> = flat.iter().map(|d| d.id.clone()).collect();
    assert_eq!(file_names(&ids), vec!["a.md", "b.txt"]);

    let deep = registry.load_directory(dir.path(), true).unwrap();
    let ids: Vec<String> = deep.iter().map(|d| d.id.clone()).collect();
    // Ids are canonical paths, so `.notes/` sorts before `a.md`.
    assert_eq!(file_names(&ids), vec!["inner.txt", "a.md", "b.txt", "c.txt"]);
}

#[test]
fn registered_loader_handles_its_format() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "paper.pdf", b"%PDF-1.7");
    write(dir.path(), "broken.pdf", b"garbage");
    write(dir.path(), "notes.txt", b"notes");

    let mut registry = LoaderRegistry::with_defaults();
    registry.register(Arc::new(FakePdfLoader));
    assert!(registry.supports(DocumentFormat::Pdf));

    let docs = registry.load_directory(dir.path(), false).unwrap();
    let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
    assert_eq!(file_names(&ids), vec!["notes.txt", "paper.pdf"]);
    assert_eq!(docs[1].text, "extracted pdf text");
    assert_eq!(docs[1].format, DocumentFormat::Pdf);
}

#[test]
fn missing_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = LoaderRegistry::with_defaults()
        .load_directory(dir.path().join("nope"), true)
        .unwrap_err();
    assert!(matches!(err, RagError::DocumentLoadError { .. }));
}
