//! Overlapping character-window chunker.
//!
//! Windows are `chunk_size` characters long. A window that ends inside the
//! text is pulled back (or slightly forward) to the last sentence ending
//! found near its edge, and the next window starts `overlap_size` characters
//! before the cut. Offsets are character offsets, not byte offsets.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::ChunkingConfig;

const BOUNDARY_LOOKBACK: usize = 200;
const BOUNDARY_LOOKAHEAD: usize = 100;
const MIN_ADVANCE: usize = 50;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence regex is valid"));

/// Caller-supplied description of the document being chunked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSource {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub chunk_index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub chunk_size: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Splits `text` into ordered chunks. Whitespace-only spans are dropped
    /// without consuming a chunk index.
    pub fn chunk_text(&self, text: &str, source: &ChunkSource) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = offsets.len() - 1;
        let size = self.config.chunk_size.max(1);

        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut position = 0;

        while position < len {
            let window_end = (position + size).min(len);
            let cut = if window_end < len {
                find_boundary(text, &offsets, position, window_end, len).unwrap_or(window_end)
            } else {
                window_end
            };

            let content = text[offsets[position]..offsets[cut]].trim();
            if !content.is_empty() {
                let chunk_index = chunks.len();
                chunks.push(TextChunk {
                    id: format!("{}_chunk_{}", source.file_id, chunk_index),
                    content: content.to_string(),
                    metadata: ChunkMetadata {
                        file_id: source.file_id.clone(),
                        original_name: source.original_name.clone(),
                        mime_type: source.mime_type.clone(),
                        tags: source.tags.clone(),
                        user_id: source.user_id.clone(),
                        chunk_index,
                        start_index: position,
                        end_index: cut,
                        chunk_size: cut - position,
                        total_chunks: 0,
                    },
                });
            }

            position = next_position(position, cut, self.config.overlap_size);
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.metadata.total_chunks = total;
        }

        tracing::debug!("Created {} chunks from text of {} characters", total, len);
        chunks
    }
}

/// Character offset just past the last sentence ending near `window_end`.
fn find_boundary(
    text: &str,
    offsets: &[usize],
    position: usize,
    window_end: usize,
    len: usize,
) -> Option<usize> {
    let search_start = window_end.saturating_sub(BOUNDARY_LOOKBACK).max(position);
    let search_end = (window_end + BOUNDARY_LOOKAHEAD).min(len);
    let window = &text[offsets[search_start]..offsets[search_end]];

    let last = SENTENCE_END.find_iter(window).last()?;
    Some(search_start + window[..last.end()].chars().count())
}

fn next_position(position: usize, cut: usize, overlap: usize) -> usize {
    let candidate = cut.saturating_sub(overlap);
    if candidate <= position || candidate + MIN_ADVANCE >= cut {
        cut
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, overlap_size: usize) -> Chunker {
        Chunker::new(ChunkingConfig {
            chunk_size,
            overlap_size,
        })
    }

    fn source() -> ChunkSource {
        ChunkSource {
            file_id: "file1".to_string(),
            tags: vec!["biology".to_string()],
            ..Default::default()
        }
    }

    fn sentences(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {} talks about cells and membranes.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunker(1500, 200).chunk_text("", &source()).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunker(1500, 200).chunk_text("  Mitochondria make ATP.  ", &source());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "file1_chunk_0");
        assert_eq!(chunks[0].content, "Mitochondria make ATP.");
        assert_eq!(chunks[0].metadata.total_chunks, 1);
        assert_eq!(chunks[0].metadata.tags, vec!["biology"]);
    }

    #[test]
    fn test_cuts_at_sentence_endings() {
        let text = sentences(40);
        let chunks = chunker(300, 60).chunk_text(&text, &source());
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.content.ends_with('.'), "chunk ended mid-sentence: {:?}", chunk.content);
        }
    }

    #[test]
    fn test_spans_cover_text_and_respect_size() {
        let text = sentences(120);
        let len = text.chars().count();
        let size = 500;
        let chunks = chunker(size, 100).chunk_text(&text, &source());

        assert_eq!(chunks[0].metadata.start_index, 0);
        assert_eq!(chunks.last().unwrap().metadata.end_index, len);
        for pair in chunks.windows(2) {
            assert!(pair[1].metadata.start_index <= pair[0].metadata.end_index);
            assert!(pair[1].metadata.start_index > pair[0].metadata.start_index);
        }
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.metadata.total_chunks, chunks.len());
            assert!(chunk.metadata.chunk_size <= size + BOUNDARY_LOOKAHEAD);
        }
    }

    #[test]
    fn test_overlap_larger_than_size_still_terminates() {
        let text = "x".repeat(1000);
        let chunks = chunker(10, 500).chunk_text(&text, &source());
        assert_eq!(chunks.len(), 100);
        assert_eq!(chunks.last().unwrap().metadata.end_index, 1000);
    }

    #[test]
    fn test_multibyte_text_uses_char_offsets() {
        let text = "Été. ".repeat(400);
        let chunks = chunker(100, 20).chunk_text(&text, &source());
        assert!(!chunks.is_empty());
        assert_eq!(chunks.last().unwrap().metadata.end_index, text.chars().count());
        assert!(chunks.iter().all(|c| c.content.starts_with('É')));
    }

    #[test]
    fn test_whitespace_spans_are_skipped() {
        let text = format!("{}{}", "a".repeat(100), " ".repeat(300));
        let chunks = chunker(100, 0).chunk_text(&text, &source());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.total_chunks, 1);
    }
}
