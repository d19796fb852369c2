//! Sentence-aware text chunker.
//!
//! Splits text into overlapping windows of at most `max_size` characters,
//! preferring to cut after a sentence terminator, then at a space, and only
//! as a last resort mid-word. Sizes are counted in `char`s so a cut never
//! lands inside a UTF-8 sequence.

use crate::models::{Chunk, Document};

/// A sentence boundary is accepted only this far (in tenths) into the window.
const SENTENCE_CUT_MIN_TENTHS: usize = 7;
/// A word boundary is accepted only this far (in tenths) into the window.
const WORD_CUT_MIN_TENTHS: usize = 8;

/// Split `text` into trimmed, non-empty chunks of at most `max_size` chars,
/// consecutive chunks sharing roughly `overlap` chars.
///
/// An `overlap` of `max_size` or more is clamped to `max_size - 1`, and the
/// cursor always moves forward by at least one character.
pub fn split_text(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    let max_size = max_size.max(1);
    let overlap = overlap.min(max_size - 1);
    let chars: Vec<char> = text.chars().collect();

    if chars.len() <= max_size {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![trimmed.to_string()];
    }

    let mut pieces = Vec::new();
    let mut cursor = 0usize;

    while cursor < chars.len() {
        let end = cursor + max_size;
        if end >= chars.len() {
            pieces.push(collect_trimmed(&chars[cursor..]));
            break;
        }

        let window = &chars[cursor..end];
        let cut = find_cut(window);
        pieces.push(collect_trimmed(&window[..cut]));

        let next = (cursor + cut).saturating_sub(overlap);
        cursor = next.max(cursor + 1);
    }

    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Length of the piece to take from `window`.
fn find_cut(window: &[char]) -> usize {
    let len = window.len();

    // Last ". ", "! ", "? " (or the same before a newline).
    let sentence_end = (0..len.saturating_sub(1))
        .rev()
        .find(|&i| matches!(window[i], '.' | '!' | '?') && matches!(window[i + 1], ' ' | '\n'));
    if let Some(pos) = sentence_end {
        if pos * 10 >= len * SENTENCE_CUT_MIN_TENTHS {
            return pos + 2;
        }
    }

    if let Some(pos) = window.iter().rposition(|&c| c == ' ') {
        if pos > 0 && pos * 10 >= len * WORD_CUT_MIN_TENTHS {
            return pos;
        }
    }

    len
}

fn collect_trimmed(chars: &[char]) -> String {
    chars.iter().collect::<String>().trim().to_string()
}

/// The text a document is chunked from: its body prefixed with its title,
/// so every chunk carries the section identity it came from.
pub fn document_text(doc: &Document) -> String {
    let title = doc.title.trim();
    let body = doc.body.trim();
    if title.is_empty() {
        body.to_string()
    } else {
        format!("Title: {}\n\nContent: {}", title, body)
    }
}

/// Chunk a document into [`Chunk`]s with ids `{document_id}_{sequence}`.
pub fn chunk_document(doc: &Document, max_size: usize, overlap: usize) -> Vec<Chunk> {
    split_text(&document_text(doc), max_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(sequence, text)| Chunk {
            id: format!("{}_{}", doc.id, sequence),
            document_id: doc.id.clone(),
            sequence,
            text,
            section_label: doc.section.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                format!(
                    "Sentence number {} talks about campus life and the library hours.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn doc(id: &str, title: &str, body: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            source_url: None,
            retrieved_at: Utc::now(),
            section: Some("catalog".to_string()),
        }
    }

    #[test]
    fn test_short_text_single_trimmed_chunk() {
        let chunks = split_text("  Hello, world!  \n", 100, 10);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(split_text("", 100, 10).is_empty());
        assert!(split_text("   \n\t ", 100, 10).is_empty());
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        // Sentence end at 80% of a 50-char window.
        let text = format!("{}. {}", "a".repeat(39), "b ".repeat(40));
        let chunks = split_text(&text, 50, 0);
        assert_eq!(chunks[0], format!("{}.", "a".repeat(39)));
    }

    #[test]
    fn test_early_sentence_boundary_ignored() {
        // The only terminator sits at 10% of the window, so the last space wins.
        let text = format!("Hi. {}", "word ".repeat(30));
        let chunks = split_text(&text, 50, 0);
        assert!(!chunks[0].ends_with("Hi."));
        assert!(chunks[0].len() > 40);
        assert!(chunks[0].ends_with("word"));
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = split_text(&text, 100, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn test_size_bound() {
        let text = prose(40);
        for (size, overlap) in [(80, 0), (80, 20), (200, 50), (333, 100)] {
            for c in split_text(&text, size, overlap) {
                assert!(
                    c.chars().count() <= size,
                    "chunk of {} chars exceeds {}",
                    c.chars().count(),
                    size
                );
                assert!(!c.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_coverage_without_overlap() {
        let text = prose(30);
        let chunks = split_text(&text, 120, 0);
        assert!(chunks.len() > 1);
        assert_eq!(normalize(&chunks.join(" ")), normalize(&text));
    }

    #[test]
    fn test_overlap_repeats_text() {
        let text = prose(20);
        let chunks = split_text(&text, 150, 40);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            // The tail of one chunk reappears at the head of the next.
            let tail: String = pair[0]
                .chars()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let tail = tail.trim();
            assert!(
                pair[1].contains(tail) || tail.is_empty(),
                "expected {:?} in {:?}",
                tail,
                pair[1]
            );
        }
        // Every word of the original survives.
        let joined = chunks.join(" ");
        for word in text.split_whitespace() {
            assert!(joined.contains(word));
        }
    }

    #[test]
    fn test_overlap_clamped_terminates() {
        let text = "y".repeat(300);
        let chunks = split_text(&text, 100, 500);
        // overlap clamps to 99, so the cursor advances one char per window.
        assert_eq!(chunks.len(), 201);
        assert!(chunks.iter().all(|c| c.len() <= 100));
    }

    #[test]
    fn test_zero_max_size_treated_as_one() {
        let chunks = split_text("abc", 0, 0);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multibyte_text_not_split_inside_char() {
        let text = "café société naïve ".repeat(30);
        let chunks = split_text(&text, 64, 8);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 64);
        }
    }

    #[test]
    fn test_chunk_document_ids_and_prefix() {
        let d = doc("fees", "Fees", &prose(10));
        let chunks = chunk_document(&d, 200, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.id, format!("fees_{}", i));
            assert_eq!(c.sequence, i);
            assert_eq!(c.document_id, "fees");
            assert_eq!(c.section_label.as_deref(), Some("catalog"));
        }
        assert!(chunks[0].text.starts_with("Title: Fees"));
    }

    #[test]
    fn test_untitled_document_uses_body() {
        let d = doc("x", "  ", "Only the body.");
        assert_eq!(document_text(&d), "Only the body.");
    }

    #[test]
    fn test_deterministic() {
        let text = prose(25);
        assert_eq!(split_text(&text, 90, 15), split_text(&text, 90, 15));
    }
}
