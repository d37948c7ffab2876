//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and three implementations:
//!
//! - [`HierarchicalChunker`]: splits on headings and paragraphs, recording the heading path
//! - [`ContextAwareChunker`]: sliding window with overlap, snapped to sentence or word ends
//! - [`SemanticChunker`]: merges adjacent sentences while their embeddings stay similar
//!
//! The set of strategies is closed ([`ChunkingStrategy`]); picking one for a
//! document is the job of the [orchestrator](crate::orchestrator).
//!
//! All sizes are measured in characters, never bytes.

mod context_aware;
mod hierarchical;
mod semantic;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use context_aware::ContextAwareChunker;
pub use hierarchical::HierarchicalChunker;
pub use semantic::SemanticChunker;

pub(crate) use hierarchical::parse_heading;

use crate::document::{Chunk, Document};
use crate::error::{Result, VaultError};

/// A segmentation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    Hierarchical,
    #[default]
    ContextAware,
    Semantic,
}

impl ChunkingStrategy {
    pub const ALL: [ChunkingStrategy; 3] =
        [ChunkingStrategy::Hierarchical, ChunkingStrategy::ContextAware, ChunkingStrategy::Semantic];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Hierarchical => "hierarchical",
            ChunkingStrategy::ContextAware => "context_aware",
            ChunkingStrategy::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hierarchical" => Ok(ChunkingStrategy::Hierarchical),
            "context_aware" | "contextaware" => Ok(ChunkingStrategy::ContextAware),
            "semantic" => Ok(ChunkingStrategy::Semantic),
            other => Err(VaultError::Config(format!("unknown chunking strategy '{other}'"))),
        }
    }
}

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s in document order with text and
/// metadata but no embeddings. A non-empty document never yields an empty
/// `Vec`; malformed input is reported as [`VaultError::Chunking`].
#[async_trait]
pub trait Chunker: Send + Sync {
    /// The strategy this chunker implements.
    fn strategy(&self) -> ChunkingStrategy;

    /// Split a document into chunks.
    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

/// Reject text no chunker can handle.
pub(crate) fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(VaultError::Chunking("document text is empty".to_string()));
    }
    if text.contains('\0') {
        return Err(VaultError::Chunking(
            "document text contains NUL bytes; is it binary?".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split on blank lines, keeping fenced code blocks (```` ``` ````) intact.
/// Returned paragraphs are trimmed and non-empty.
pub(crate) fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if line.trim().is_empty() && !in_fence {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);
    paragraphs
}

fn flush_paragraph(lines: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
    lines.clear();
}

/// Split a paragraph into sentences ending in `.`, `!` or `?` followed by whitespace.
pub(crate) fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    let sentence = paragraph[start..next_i].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_i;
                }
            } else {
                let sentence = paragraph[start..i + c.len_utf8()].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = paragraph.len();
            }
        }
    }

    let rest = paragraph[start.min(paragraph.len())..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Pack whitespace-separated words into pieces of at most `max_chars`
/// characters; words longer than `max_chars` are cut.
pub(crate) fn split_by_size(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = char_len(word);

        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max_chars) {
                pieces.push(part.iter().collect());
            }
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            pieces.push(std::mem::replace(&mut current, word.to_string()));
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_round_trips_through_strings() {
        for strategy in ChunkingStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<ChunkingStrategy>().unwrap(), strategy);
        }
        assert_eq!("Context-Aware".parse::<ChunkingStrategy>().unwrap(), ChunkingStrategy::ContextAware);
        assert!("dynamic".parse::<ChunkingStrategy>().is_err());
    }

    #[test]
    fn validate_rejects_blank_and_binary_text() {
        assert!(validate_text(" \n\t").is_err());
        assert!(validate_text("abc\0def").is_err());
        assert!(validate_text("fine").is_ok());
    }

    #[test]
    fn paragraphs_respect_code_fences() {
        let text = "Intro line.\n\n```\nfn main() {\n\n}\n```\n\nOutro.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(paragraphs.len(), 3);
        assert!(paragraphs[1].contains("fn main"));
        assert!(paragraphs[1].ends_with("```"));
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_sentences("First one. Second one! Is this third? Version 1.2 stays whole");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Is this third?", "Version 1.2 stays whole"]
        );
    }

    #[test]
    fn split_by_size_respects_char_limit_for_multibyte_text() {
        let text = "über straße naïve café ".repeat(20);
        for piece in split_by_size(&text, 30) {
            assert!(char_len(&piece) <= 30, "{piece}");
        }
        assert_eq!(split_by_size("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }
}
