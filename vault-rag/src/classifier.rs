//! Content classification for dynamic strategy selection.
//!
//! [`classify`] inspects a document's text and picks a [`ChunkingStrategy`]
//! and target size for it. The result is a plain [`StrategyDecision`] that
//! carries every signal it was derived from, so callers can log or inspect
//! why a strategy was chosen.

use std::collections::HashSet;

use serde::Serialize;

use crate::chunking::{ChunkingStrategy, char_len, parse_heading, split_paragraphs, split_sentences};
use crate::config::VaultConfig;

const STRUCTURED_HEADINGS: usize = 2;
const STRUCTURED_RATIO: f32 = 0.25;
const MIXED_RATIO: f32 = 0.08;
const SEMANTIC_COMPLEXITY: f32 = 0.6;
const LONG_SENTENCE_WORDS: f32 = 30.0;

/// Coarse shape of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Headings, lists, tables or code dominate.
    Structured,
    /// Running text.
    Prose,
    /// Prose with some structure.
    Mixed,
}

/// The classifier's choice and the signals behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyDecision {
    pub strategy: ChunkingStrategy,
    /// Target chunk size in characters for the chosen strategy.
    pub target_size: usize,
    pub content_type: ContentType,
    /// In `[0, 1]`; higher means denser, more varied text.
    pub complexity: f32,
    pub heading_count: usize,
    pub paragraph_count: usize,
    pub vocabulary_diversity: f32,
    pub avg_sentence_words: f32,
    /// Share of non-blank lines that are headings, list items, table rows or code fences.
    pub structural_ratio: f32,
    pub reason: &'static str,
}

/// Pick a strategy and target size for `text`.
pub fn classify(text: &str, config: &VaultConfig) -> StrategyDecision {
    let signals = Signals::measure(text);
    let content_type = signals.content_type();
    let complexity = signals.complexity();
    let base = config.target_chunk_size.max(1);

    let (strategy, target_size, reason) = if char_len(text) < base / 2 {
        (ChunkingStrategy::Hierarchical, (base / 2).max(1), "short document")
    } else if content_type == ContentType::Structured {
        (ChunkingStrategy::Hierarchical, base, "structured content")
    } else {
        let scale = (1.25 - 0.5 * complexity).clamp(0.75, 1.25);
        let scaled = ((base as f32) * scale).round() as usize;
        if content_type == ContentType::Prose && complexity >= SEMANTIC_COMPLEXITY {
            (ChunkingStrategy::Semantic, scaled, "complex prose")
        } else {
            (ChunkingStrategy::ContextAware, scaled, "general text")
        }
    };

    StrategyDecision {
        strategy,
        target_size,
        content_type,
        complexity,
        heading_count: signals.headings,
        paragraph_count: signals.paragraphs,
        vocabulary_diversity: signals.diversity,
        avg_sentence_words: signals.avg_sentence_words,
        structural_ratio: signals.structural_ratio,
        reason,
    }
}

struct Signals {
    headings: usize,
    paragraphs: usize,
    diversity: f32,
    avg_sentence_words: f32,
    structural_ratio: f32,
}

impl Signals {
    fn measure(text: &str) -> Self {
        let mut headings = 0;
        let mut structural = 0;
        let mut lines = 0;
        let mut in_fence = false;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            lines += 1;
            if line.starts_with("```") {
                in_fence = !in_fence;
                structural += 1;
            } else if in_fence {
                structural += 1;
            } else if parse_heading(line).is_some() {
                headings += 1;
                structural += 1;
            } else if is_list_item(line) || line.starts_with('|') {
                structural += 1;
            }
        }

        let paragraphs = split_paragraphs(text);
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
        let sentences: usize = paragraphs.iter().map(|p| split_sentences(p).len()).sum();

        Self {
            headings,
            paragraphs: paragraphs.len(),
            diversity: ratio(unique.len(), words.len()),
            avg_sentence_words: ratio(words.len(), sentences),
            structural_ratio: ratio(structural, lines),
        }
    }

    fn content_type(&self) -> ContentType {
        if self.headings >= STRUCTURED_HEADINGS || self.structural_ratio >= STRUCTURED_RATIO {
            ContentType::Structured
        } else if self.headings >= 1 || self.structural_ratio >= MIXED_RATIO {
            ContentType::Mixed
        } else {
            ContentType::Prose
        }
    }

    fn complexity(&self) -> f32 {
        let sentence_length = (self.avg_sentence_words / LONG_SENTENCE_WORDS).min(1.0);
        (0.5 * self.diversity + 0.5 * sentence_length).clamp(0.0, 1.0)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 { 0.0 } else { numerator as f32 / denominator as f32 }
}

/// `- item`, `* item`, `+ item`, `1. item`, `2) item`.
fn is_list_item(line: &str) -> bool {
    if let Some(rest) = line.strip_prefix(['-', '*', '+']) {
        return rest.starts_with(' ');
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && (line[digits..].starts_with(". ") || line[digits..].starts_with(") "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VaultConfig {
        VaultConfig::default()
    }

    #[test]
    fn markdown_with_headings_is_hierarchical() {
        let para = "This paragraph explains one part of the system in plain words. ".repeat(5);
        let text = format!("# Overview\n\n{para}\n\n## Details\n\n{para}\n\n## Limits\n\n{para}");
        let decision = classify(&text, &config());

        assert_eq!(decision.content_type, ContentType::Structured);
        assert_eq!(decision.strategy, ChunkingStrategy::Hierarchical);
        assert_eq!(decision.heading_count, 3);
        assert_eq!(decision.target_size, 1000);
    }

    #[test]
    fn short_text_gets_half_size_hierarchical() {
        let decision = classify("A brief note about lunch.", &config());
        assert_eq!(decision.strategy, ChunkingStrategy::Hierarchical);
        assert_eq!(decision.target_size, 500);
        assert_eq!(decision.reason, "short document");
    }

    #[test]
    fn varied_long_sentences_are_semantic() {
        let text = (0..40)
            .map(|s| (0..30).map(|w| format!("w{s}x{w}")).collect::<Vec<_>>().join(" ") + ".")
            .collect::<Vec<_>>()
            .join(" ");
        let decision = classify(&text, &config());

        assert_eq!(decision.content_type, ContentType::Prose);
        assert!(decision.complexity >= 0.99, "{decision:?}");
        assert_eq!(decision.strategy, ChunkingStrategy::Semantic);
        assert_eq!(decision.target_size, 750);
    }

    #[test]
    fn repetitive_prose_is_context_aware_with_larger_windows() {
        let text = "The cat sat on the mat. ".repeat(60);
        let decision = classify(&text, &config());

        assert_eq!(decision.strategy, ChunkingStrategy::ContextAware);
        assert!(decision.complexity < 0.2);
        assert!(decision.target_size > 1000);
    }

    #[test]
    fn list_heavy_text_is_structured() {
        let text = "Shopping list for the week ahead of the holidays:\n".to_string()
            + &"- one item that we need to buy\n".repeat(30);
        let decision = classify(&text, &config());
        assert_eq!(decision.content_type, ContentType::Structured);
        assert_eq!(decision.heading_count, 0);
    }

    #[test]
    fn list_item_detection() {
        assert!(is_list_item("- milk"));
        assert!(is_list_item("12) eggs"));
        assert!(is_list_item("3. flour"));
        assert!(!is_list_item("-dash"));
        assert!(!is_list_item("2024 was a year"));
    }
}
