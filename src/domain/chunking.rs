//! Recursive text splitting.
//!
//! Pages are cut into pieces along the coarsest boundary that yields pieces
//! no longer than `chunk_size` characters (paragraph, line, sentence, word,
//! then single characters). Pieces are then merged greedily into chunks, and
//! each new chunk starts with as many trailing pieces of the previous chunk
//! as fit into `chunk_overlap`.
//!
//! Chunks are exact slices of the page: nothing is trimmed, so dropping the
//! overlapping prefix of every chunk after the first and concatenating
//! reproduces the page text.

use std::collections::VecDeque;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{errors::DomainError, Document, DocumentChunk};

pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingOptions {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DomainError> {
        let options = Self {
            chunk_size,
            chunk_overlap,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_size == 0 {
            return Err(DomainError::validation("chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DomainError::validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// A chunk of a single text, with its character span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSlice<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    options: ChunkingOptions,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(options: ChunkingOptions) -> Result<Self, DomainError> {
        options.validate()?;
        Ok(Self {
            options,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn split_text<'a>(&self, text: &'a str) -> Vec<TextSlice<'a>> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        self.collect_pieces(text, 0..text.len(), 0, &mut pieces);

        let mut offsets = CharOffsets::new(text);
        self.merge(text, pieces)
            .into_iter()
            .map(|range| TextSlice {
                start: offsets.at(range.start),
                end: offsets.at(range.end),
                text: &text[range],
            })
            .collect()
    }

    /// Splits every page of `document`. Chunks never span pages;
    /// `chunk_index` runs across the whole document.
    pub fn split_document(&self, document: &Document) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();

        for page in &document.pages {
            for slice in self.split_text(&page.text) {
                chunks.push(DocumentChunk {
                    id: Uuid::new_v4(),
                    document_id: document.id,
                    topic: document.topic.clone(),
                    chunk_index: chunks.len(),
                    page: page.number,
                    start: slice.start,
                    end: slice.end,
                    content: slice.text.to_string(),
                });
            }
        }

        chunks
    }

    /// Cuts `range` into contiguous byte ranges of at most `chunk_size`
    /// characters each.
    fn collect_pieces(
        &self,
        text: &str,
        range: Range<usize>,
        level: usize,
        out: &mut Vec<Range<usize>>,
    ) {
        if range.is_empty() {
            return;
        }
        if char_len(&text[range.clone()]) <= self.options.chunk_size {
            out.push(range);
            return;
        }

        let Some(separator) = self.separators.get(level) else {
            self.split_by_chars(text, range, out);
            return;
        };

        let segments = split_keeping_separator(text, range.clone(), separator);
        if segments.len() == 1 {
            self.collect_pieces(text, range, level + 1, out);
            return;
        }

        for segment in segments {
            self.collect_pieces(text, segment, level + 1, out);
        }
    }

    fn split_by_chars(&self, text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
        let mut start = range.start;
        let mut count = 0;

        for (offset, _) in text[range.clone()].char_indices() {
            if count == self.options.chunk_size {
                out.push(start..range.start + offset);
                start = range.start + offset;
                count = 0;
            }
            count += 1;
        }

        if start < range.end {
            out.push(start..range.end);
        }
    }

    fn merge(&self, text: &str, pieces: Vec<Range<usize>>) -> Vec<Range<usize>> {
        let ChunkingOptions {
            chunk_size,
            chunk_overlap,
        } = self.options;

        let mut chunks = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(&text[piece.clone()]);

            if total + len > chunk_size && !window.is_empty() {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    chunks.push(first.0.start..last.0.end);
                }
                while total > chunk_overlap || (total > 0 && total + len > chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            chunks.push(first.0.start..last.0.end);
        }

        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits at `separator`, keeping it attached to the preceding segment so
/// the segments still cover `range` exactly.
fn split_keeping_separator(text: &str, range: Range<usize>, separator: &str) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut start = range.start;
    let slice = &text[range.clone()];

    for (pos, _) in slice.match_indices(separator) {
        let end = range.start + pos + separator.len();
        if end > start {
            segments.push(start..end);
            start = end;
        }
    }

    if start < range.end {
        segments.push(start..range.end);
    }

    segments
}

/// Byte-to-character offset conversion for increasing byte positions.
struct CharOffsets<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharOffsets<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    fn at(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += char_len(&self.text[self.byte..byte]);
        self.byte = byte;
        self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Page, Topic};
    use proptest::prelude::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(ChunkingOptions::new(size, overlap).unwrap()).unwrap()
    }

    /// Concatenates chunks, dropping the prefix each one shares with its
    /// predecessor.
    fn reassemble(slices: &[TextSlice<'_>]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for slice in slices {
            let skip = covered - slice.start;
            out.extend(slice.text.chars().skip(skip));
            covered = slice.end;
        }
        out
    }

    #[test]
    fn test_options_validation() {
        assert!(ChunkingOptions::new(0, 0).is_err());
        assert!(ChunkingOptions::new(100, 100).is_err());
        assert!(ChunkingOptions::new(100, 150).is_err());
        assert!(ChunkingOptions::new(100, 99).is_ok());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "Hello world.\n\nThis is a test.";
        let slices = splitter(100, 10).split_text(text);

        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].text, text);
        assert_eq!((slices[0].start, slices[0].end), (0, text.chars().count()));
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(splitter(10, 2).split_text("").is_empty());
        assert!(splitter(10, 2).split_text(" \n\n ").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let slices = splitter(20, 0).split_text(text);

        assert_eq!(
            slices.iter().map(|s| s.text).collect::<Vec<_>>(),
            vec!["First paragraph.\n\n", "Second paragraph.\n\n", "Third paragraph."]
        );
    }

    #[test]
    fn test_falls_back_to_sentences_then_words() {
        let text = "Dengue spreads through mosquitoes. Avoid stagnant water near homes.";
        let slices = splitter(40, 0).split_text(text);

        assert_eq!(slices[0].text, "Dengue spreads through mosquitoes. ");
        assert!(slices.iter().all(|s| s.text.chars().count() <= 40));
        assert_eq!(reassemble(&slices), text);
    }

    #[test]
    fn test_character_fallback_for_long_words() {
        let text = "a".repeat(25);
        let slices = splitter(10, 3).split_text(&text);

        assert!(slices.iter().all(|s| s.text.chars().count() <= 10));
        assert_eq!(reassemble(&slices), text);
    }

    #[test]
    fn test_overlap_is_shared_text() {
        let text = "one two three four five six seven eight nine ten";
        let slices = splitter(15, 6).split_text(text);

        assert!(slices.len() > 1);
        for pair in slices.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            assert!(next.start <= prev.end, "gap between chunks");
            let overlap = prev.end - next.start;
            assert!(overlap <= 6);
            assert!(overlap < next.end - next.start);
        }
        assert_eq!(reassemble(&slices), text);
    }

    #[test]
    fn test_multibyte_spans_are_char_offsets() {
        let text = "Anémie ferriprive. Fièvre élevée et fatigue.";
        let slices = splitter(20, 4).split_text(text);
        let chars: Vec<char> = text.chars().collect();

        for slice in &slices {
            let expected: String = chars[slice.start..slice.end].iter().collect();
            assert_eq!(slice.text, expected);
        }
    }

    #[test]
    fn test_split_document_numbers_across_pages() {
        let topic = Topic::new("Asthma").unwrap();
        let doc = Document::new(
            topic.clone(),
            "asthma.pdf",
            vec![
                Page::new(1, "Asthma is a chronic disease.\n\nIt affects airways."),
                Page::new(2, ""),
                Page::new(3, "Inhalers help manage symptoms."),
            ],
        );

        let chunks = splitter(30, 5).split_document(&doc);

        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.document_id, doc.id);
            assert_eq!(chunk.topic, topic);
        }
        assert!(chunks.iter().all(|c| c.page != 2));
        assert_eq!(chunks.last().unwrap().page, 3);
    }

    fn arb_text() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                "[a-zA-Z]{1,12}",
                Just(" ".to_string()),
                Just(". ".to_string()),
                Just("\n".to_string()),
                Just("\n\n".to_string()),
                Just("é".to_string()),
            ],
            1..120,
        )
        .prop_map(|parts| parts.concat())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_text_and_reassemble(
            text in arb_text(),
            size in 1usize..80,
            overlap_ratio in 0.0f64..1.0,
        ) {
            let overlap = ((size as f64) * overlap_ratio) as usize % size;
            let slices = splitter(size, overlap).split_text(&text);

            if text.trim().is_empty() {
                prop_assert!(slices.is_empty());
            } else {
                prop_assert_eq!(slices[0].start, 0);
                prop_assert_eq!(slices.last().unwrap().end, text.chars().count());
                for slice in &slices {
                    prop_assert!(slice.end - slice.start <= size);
                    prop_assert!(slice.end > slice.start);
                }
                for pair in slices.windows(2) {
                    prop_assert!(pair[1].start <= pair[0].end);
                    prop_assert!(pair[1].start > pair[0].start);
                    prop_assert!(pair[0].end - pair[1].start <= overlap);
                }
                prop_assert_eq!(reassemble(&slices), text);
            }
        }
    }
}
