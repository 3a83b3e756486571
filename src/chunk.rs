//! Overlapping word-window chunker.
//!
//! Splits each parsed segment into windows of `chunk_words` words with
//! `overlap_words` words shared between consecutive windows, preserving
//! the segment's page/location on every chunk. Deterministic for a fixed
//! input and configuration.

use uuid::Uuid;

use crate::models::{Chunk, Segment};

/// Chunk a document's segments into overlapping word windows.
///
/// Ordinals are contiguous across the whole document, starting at
/// `first_ordinal`; the return value is the next free ordinal, so callers
/// chunking several documents into one index keep insertion order global.
pub fn chunk_segments(
    filename: &str,
    segments: &[Segment],
    chunk_words: usize,
    overlap_words: usize,
    first_ordinal: i64,
    out: &mut Vec<Chunk>,
) -> i64 {
    debug_assert!(overlap_words < chunk_words);
    let step = chunk_words - overlap_words;

    let mut ordinal = first_ordinal;
    for segment in segments {
        let words: Vec<&str> = segment.text.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let mut start = 0;
        loop {
            let end = (start + chunk_words).min(words.len());
            let text = words[start..end].join(" ");
            if !text.is_empty() {
                out.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    filename: filename.to_string(),
                    page: segment.page,
                    ordinal,
                    text,
                });
                ordinal += 1;
            }
            if end == words.len() {
                break;
            }
            start += step;
        }
    }

    ordinal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, page: i64) -> Segment {
        Segment {
            text: text.to_string(),
            page,
        }
    }

    #[test]
    fn short_segment_yields_single_chunk() {
        let mut chunks = Vec::new();
        let next = chunk_segments("a.txt", &[seg("hello world", 1)], 600, 100, 0, &mut chunks);
        assert_eq!(chunks.len(), 1);
        assert_eq!(next, 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].ordinal, 0);
    }

    #[test]
    fn long_segment_splits_with_overlap() {
        let words: Vec<String> = (0..25).map(|i| format!("w{}", i)).collect();
        let mut chunks = Vec::new();
        chunk_segments("a.txt", &[seg(&words.join(" "), 1)], 10, 4, 0, &mut chunks);

        // step = 6: windows start at 0, 6, 12, 18
        assert_eq!(chunks.len(), 4);
        assert!(chunks[0].text.starts_with("w0"));
        assert!(chunks[1].text.starts_with("w6"));
        // Overlap: the last 4 words of window N open window N+1
        assert!(chunks[0].text.ends_with("w9"));
        assert!(chunks[1].text.contains("w6 w7 w8 w9"));
        // Final window covers the tail and stops at the last word
        assert!(chunks[3].text.starts_with("w18"));
        assert!(chunks[3].text.ends_with("w24"));
    }

    #[test]
    fn ordinals_contiguous_across_segments_and_documents() {
        let mut chunks = Vec::new();
        let next = chunk_segments(
            "a.txt",
            &[seg("one two three", 1), seg("four five", 2)],
            2,
            0,
            0,
            &mut chunks,
        );
        let next = chunk_segments("b.txt", &[seg("six seven", 1)], 2, 0, next, &mut chunks);
        assert_eq!(next, chunks.len() as i64);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i as i64, "ordinal mismatch at {}", i);
        }
        assert_eq!(chunks.last().unwrap().filename, "b.txt");
    }

    #[test]
    fn empty_segments_produce_no_chunks() {
        let mut chunks = Vec::new();
        let next = chunk_segments("a.txt", &[seg("   ", 1)], 10, 2, 0, &mut chunks);
        assert!(chunks.is_empty());
        assert_eq!(next, 0);
    }

    #[test]
    fn deterministic_text_for_fixed_input() {
        let segs = [seg("alpha beta gamma delta epsilon zeta", 3)];
        let mut a = Vec::new();
        let mut b = Vec::new();
        chunk_segments("a.txt", &segs, 3, 1, 0, &mut a);
        chunk_segments("a.txt", &segs, 3, 1, 0, &mut b);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.page, y.page);
            assert_eq!(x.ordinal, y.ordinal);
        }
    }
}
