use async_trait::async_trait;

use super::{ChunkingStrategy, Chunker, validate_text};
use crate::config::overlap_for;
use crate::document::{Chunk, Document};
use crate::error::Result;

const SENTENCE_END_CONFIDENCE: f32 = 0.9;
const WORD_END_CONFIDENCE: f32 = 0.7;
const HARD_CUT_CONFIDENCE: f32 = 0.5;

/// Slides a fixed-size window across the text with overlap.
///
/// The window end is pulled back to the last sentence end (or failing that
/// the last word end) within the final fifth of the window, and the next
/// window starts on a word boundary `overlap` characters before the previous
/// end. Each chunk after the first records the exact number of characters it
/// shares with its predecessor in `overlap_with_previous`.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::ContextAwareChunker;
///
/// let chunker = ContextAwareChunker::new(1000, 0.15);
/// let chunks = chunker.chunk(&document).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ContextAwareChunker {
    window: usize,
    overlap: usize,
}

impl ContextAwareChunker {
    /// Create a chunker with `window` characters per chunk and an overlap of
    /// `overlap_ratio * window` characters (capped at half the window).
    pub fn new(window: usize, overlap_ratio: f32) -> Self {
        let window = window.max(1);
        let overlap = overlap_for(window, overlap_ratio).min(window / 2);
        Self { window, overlap }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Character spans `(start, end, confidence)` of each window.
    fn spans(&self, chars: &[char]) -> Vec<(usize, usize, f32)> {
        let n = chars.len();
        let mut spans = Vec::new();
        let mut start = skip_whitespace(chars, 0);

        while start < n {
            let hard_end = (start + self.window).min(n);
            let (end, confidence) = if hard_end == n {
                (trim_end(chars, start, n), SENTENCE_END_CONFIDENCE)
            } else {
                self.snap_end(chars, start, hard_end)
            };
            spans.push((start, end, confidence));

            if hard_end == n {
                break;
            }

            let mut next = end.saturating_sub(self.overlap).max(start + 1);
            while next < end && !is_word_start(chars, next) {
                next += 1;
            }
            start = skip_whitespace(chars, next);
        }

        spans
    }

    fn snap_end(&self, chars: &[char], start: usize, hard_end: usize) -> (usize, f32) {
        let lower = hard_end.saturating_sub(self.window / 5).max(start + 1);

        for end in (lower..=hard_end).rev() {
            if matches!(chars[end - 1], '.' | '!' | '?') && chars[end].is_whitespace() {
                return (end, SENTENCE_END_CONFIDENCE);
            }
        }
        for end in (lower..=hard_end).rev() {
            if chars[end].is_whitespace() && !chars[end - 1].is_whitespace() {
                return (end, WORD_END_CONFIDENCE);
            }
        }
        (hard_end, HARD_CUT_CONFIDENCE)
    }
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn trim_end(chars: &[char], start: usize, mut end: usize) -> usize {
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    end
}

fn is_word_start(chars: &[char], i: usize) -> bool {
    !chars[i].is_whitespace() && (i == 0 || chars[i - 1].is_whitespace())
}

#[async_trait]
impl Chunker for ContextAwareChunker {
    fn strategy(&self) -> ChunkingStrategy {
        ChunkingStrategy::ContextAware
    }

    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        validate_text(&document.text)?;

        let chars: Vec<char> = document.text.chars().collect();
        let mut chunks = Vec::new();
        let mut previous_end: Option<usize> = None;

        for (sequence, (start, end, confidence)) in self.spans(&chars).into_iter().enumerate() {
            let text: String = chars[start..end].iter().collect();
            let mut chunk = Chunk::new(document, self.strategy(), sequence, text, confidence);
            if let Some(previous_end) = previous_end {
                chunk = chunk.with_overlap(previous_end.saturating_sub(start));
            }
            previous_end = Some(end);
            chunks.push(chunk);
        }

        Ok(chunks)
    }
}
