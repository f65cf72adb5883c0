//! Recursive separator-based splitting with character-bounded merge and overlap.
//!
//! Every chunk is an exact byte slice of its parent text; separators stay
//! attached to the start of the piece that follows them. Lengths are counted
//! in chars, not bytes.

use std::collections::VecDeque;
use std::ops::Range;

use tracing::debug;

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// Highest priority first. The empty separator means "split into chars".
pub const SEPARATORS: &[&str] = &[
    "\n## ", "\n### ", "\n#### ",
    "\n- ", "\n* ", "\n1. ",
    "\n\n", "\n",
    ". ", "? ", "! ",
    ";", ":", " ",
    "",
];

const QUESTION_MARK: &str = "Q: ";
const ANSWER_MARK: &str = "A: ";
const ANSWER_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({chunk_overlap}) must be < chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn chunk_overlap(&self) -> usize { self.chunk_overlap }

    /// Split one document. Chunks inherit the parent's metadata; Q&A documents
    /// get question chunks completed with the start of their answer.
    pub fn split(&self, doc: &Document) -> Vec<Chunk> {
        let spans = self.split_text(&doc.text);
        let total = spans.len();
        let qa = doc.is_qa();
        spans
            .into_iter()
            .enumerate()
            .map(|(i, span)| {
                let slice = &doc.text[span.clone()];
                let text = if qa {
                    repair_question(&doc.text, span.start, slice).unwrap_or_else(|| slice.to_string())
                } else {
                    slice.to_string()
                };
                Chunk { text, span, chunk_index: i, chunk_total: total, metadata: doc.metadata.clone() }
            })
            .collect()
    }

    pub fn split_documents(&self, docs: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = docs.iter().flat_map(|d| self.split(d)).collect();
        debug!(documents = docs.len(), chunks = chunks.len(), "split documents");
        chunks
    }

    /// Byte spans of the chunks of `text`, in order.
    pub fn split_text(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.split_range(text, 0..text.len(), SEPARATORS, &mut out);
        out
    }

    fn split_range(&self, text: &str, range: Range<usize>, separators: &[&str], out: &mut Vec<Range<usize>>) {
        let segment = &text[range.clone()];
        let Some(pos) = separators.iter().position(|s| s.is_empty() || segment.contains(s)) else {
            out.push(range);
            return;
        };
        let remaining = &separators[pos + 1..];
        let pieces = split_keeping_separator(segment, separators[pos], range.start);

        let mut fitting: Vec<Range<usize>> = Vec::new();
        for piece in pieces {
            if char_len(text, &piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                self.merge(text, std::mem::take(&mut fitting), out);
            }
            if remaining.is_empty() {
                out.push(piece);
            } else {
                self.split_range(text, piece, remaining, out);
            }
        }
        if !fitting.is_empty() {
            self.merge(text, fitting, out);
        }
    }

    /// Greedy merge of adjacent pieces up to `chunk_size` chars. After each
    /// emitted chunk, pieces are dropped from the front until at most
    /// `chunk_overlap` chars remain to seed the next one.
    fn merge(&self, text: &str, pieces: Vec<Range<usize>>, out: &mut Vec<Range<usize>>) {
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;
        for piece in pieces {
            let len = char_len(text, &piece);
            if total + len > self.chunk_size && !window.is_empty() {
                out.push(window_span(&window));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, n)) => total -= n,
                        None => break,
                    }
                }
            }
            total += len;
            window.push_back((piece, len));
        }
        if !window.is_empty() {
            out.push(window_span(&window));
        }
    }
}

fn window_span(window: &VecDeque<(Range<usize>, usize)>) -> Range<usize> {
    match (window.front(), window.back()) {
        (Some((first, _)), Some((last, _))) => first.start..last.end,
        _ => 0..0,
    }
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

/// Split `segment` before every occurrence of `sep`; empty pieces are dropped.
/// Returned ranges are absolute (offset by `base`).
fn split_keeping_separator(segment: &str, sep: &str, base: usize) -> Vec<Range<usize>> {
    if sep.is_empty() {
        return segment
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }
    let mut cuts: Vec<usize> = segment.match_indices(sep).map(|(i, _)| i).collect();
    cuts.push(segment.len());
    let mut pieces = Vec::with_capacity(cuts.len());
    let mut start = 0;
    for cut in cuts {
        if cut > start {
            pieces.push(base + start..base + cut);
        }
        start = cut;
    }
    pieces
}

/// A question chunk that lost its answer becomes "question\nA: <excerpt>...".
fn repair_question(full_text: &str, chunk_start: usize, chunk: &str) -> Option<String> {
    if !chunk.contains(QUESTION_MARK) || chunk.contains(ANSWER_MARK) {
        return None;
    }
    let q_rel = chunk.find(QUESTION_MARK)?;
    let question = &chunk[q_rel..];
    let q_abs = chunk_start + q_rel;
    let answer_start = q_abs + full_text[q_abs..].find(ANSWER_MARK)?;
    let excerpt: String = full_text[answer_start..].chars().take(ANSWER_EXCERPT_CHARS).collect();
    Some(format!("{question}\n{excerpt}..."))
}
