//! Property tests for fixed-size and recursive chunking.

use proptest::prelude::*;
use vault_rag::{
    Chunk, Chunker, Document, DocumentFormat, FixedSizeChunker, RagError, RecursiveChunker,
    chunk_text,
};

/// Expected chunk count for a text of `len` characters.
fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
    match len {
        0 => 0,
        l if l <= overlap => 1,
        l => (l - overlap).div_ceil(size - overlap),
    }
}

/// Generate a valid `(chunk_size, chunk_overlap)` pair.
fn arb_window() -> impl Strategy<Value = (usize, usize)> {
    (1usize..40).prop_flat_map(|size| (Just(size), 0..size))
}

/// Text mixing ASCII and multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    "[a-zé漢 \n]{0,200}"
}

/// *For any* valid window and text, the chunk count follows the stride formula,
/// offsets stay within the text, consecutive chunks share exactly
/// `chunk_overlap` characters, and the chunks reassemble into the text.
mod prop_chunking_windows {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn count_matches_stride_formula((size, overlap) in arb_window(), text in arb_text()) {
            let len = text.chars().count();
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();
            prop_assert_eq!(chunks.len(), expected_count(len, size, overlap));
        }

        #[test]
        fn offsets_bounded_and_overlapping((size, overlap) in arb_window(), text in arb_text()) {
            let len = text.chars().count();
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.sequence_index, i);
                prop_assert_eq!(&chunk.id, &format!("doc_{i}"));
                prop_assert!(chunk.char_start < chunk.char_end);
                prop_assert!(chunk.char_end <= len);
                prop_assert!(chunk.char_end - chunk.char_start <= size);
                prop_assert_eq!(chunk.text.chars().count(), chunk.char_end - chunk.char_start);
            }
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[1].char_start, pair[0].char_start + size - overlap);
                prop_assert_eq!(pair[0].char_end - pair[1].char_start, overlap);
            }
            if let Some(last) = chunks.last() {
                prop_assert_eq!(last.char_end, len);
            }
        }

        #[test]
        fn chunks_reassemble_into_text((size, overlap) in arb_window(), text in arb_text()) {
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();
            let mut rebuilt = String::new();
            for (i, chunk) in chunks.iter().enumerate() {
                let skip = if i == 0 { 0 } else { overlap };
                rebuilt.extend(chunk.text.chars().skip(skip));
            }
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn chunking_is_deterministic((size, overlap) in arb_window(), text in arb_text()) {
            let first = chunk_text("doc", &text, size, overlap).unwrap();
            let second = chunk_text("doc", &text, size, overlap).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}

/// Prose with paragraphs, lines, and words of varying length.
fn arb_prose() -> impl Strategy<Value = String> {
    let word = "[a-zé漢]{1,12}";
    let separator = prop_oneof![4 => Just(" "), 1 => Just("\n"), 1 => Just("\n\n")];
    prop::collection::vec((word, separator), 0..40).prop_map(|parts| {
        parts.into_iter().map(|(word, separator)| word + separator).collect()
    })
}

fn recursive_chunks(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let chunker = RecursiveChunker::new(size, overlap).unwrap();
    chunker.chunk(&Document::new("doc", text, DocumentFormat::Text)).unwrap()
}

/// *For any* valid window and text, recursive chunks are slices of the text
/// no longer than `chunk_size`, they cover it from start to end, and
/// consecutive chunks advance while sharing at most `chunk_overlap` characters.
mod prop_recursive_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_are_bounded_slices((size, overlap) in arb_window(), text in arb_prose()) {
            let chars: Vec<char> = text.chars().collect();
            let chunks = recursive_chunks(&text, size, overlap);

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.sequence_index, i);
                prop_assert_eq!(&chunk.id, &format!("doc_{i}"));
                prop_assert!(chunk.char_start < chunk.char_end);
                prop_assert!(chunk.char_end <= chars.len());
                prop_assert!(chunk.char_end - chunk.char_start <= size);
                let slice: String = chars[chunk.char_start..chunk.char_end].iter().collect();
                prop_assert_eq!(&chunk.text, &slice);
            }
        }

        #[test]
        fn chunks_cover_text_with_bounded_overlap(
            (size, overlap) in arb_window(),
            text in arb_prose(),
        ) {
            let len = text.chars().count();
            let chunks = recursive_chunks(&text, size, overlap);

            prop_assert_eq!(chunks.is_empty(), len == 0);
            if let (Some(first), Some(last)) = (chunks.first(), chunks.last()) {
                prop_assert_eq!(first.char_start, 0);
                prop_assert_eq!(last.char_end, len);
            }
            for pair in chunks.windows(2) {
                prop_assert!(pair[1].char_start > pair[0].char_start);
                prop_assert!(pair[1].char_end > pair[0].char_end);
                prop_assert!(pair[1].char_start <= pair[0].char_end);
                prop_assert!(pair[0].char_end - pair[1].char_start <= overlap);
            }
        }

        #[test]
        fn recursive_chunking_is_deterministic(
            (size, overlap) in arb_window(),
            text in arb_prose(),
        ) {
            prop_assert_eq!(
                recursive_chunks(&text, size, overlap),
                recursive_chunks(&text, size, overlap)
            );
        }
    }
}

#[test]
fn recursive_chunker_rejects_invalid_windows() {
    for (size, overlap) in [(0, 0), (5, 5), (5, 8)] {
        let err = RecursiveChunker::new(size, overlap).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)), "({size}, {overlap}) accepted");
    }
}

#[test]
fn chunker_uses_document_id_as_source() {
    let chunker = FixedSizeChunker::new(9, 3).unwrap();
    let document = Document::new("notes/week1.md", "AAAA BBBB CCCC DDDD", DocumentFormat::Markdown);
    let chunks = chunker.chunk(&document).unwrap();

    let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["notes/week1.md_0", "notes/week1.md_1", "notes/week1.md_2"]);
    assert!(chunks.iter().all(|c| c.source_id == "notes/week1.md"));
}

#[test]
fn invalid_windows_are_configuration_errors() {
    for (size, overlap) in [(0, 0), (5, 5), (5, 8)] {
        let err = FixedSizeChunker::new(size, overlap).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)), "({size}, {overlap}) accepted");
        assert!(chunk_text("doc", "text", size, overlap).is_err());
    }
}
