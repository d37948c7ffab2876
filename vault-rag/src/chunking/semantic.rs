use async_trait::async_trait;
use tracing::debug;

use super::{ChunkingStrategy, Chunker, char_len, split_by_size, split_paragraphs, split_sentences, validate_text};
use crate::document::{Chunk, Document};
use crate::embedding::EmbeddingGenerator;
use crate::error::Result;
use crate::metric::cosine_similarity;

/// Groups adjacent sentences while their embeddings stay similar.
///
/// The text is cut into sentence units (sentences longer than `max_size` are
/// split at word boundaries), all units are embedded in one batch, and
/// neighbours are merged greedily while their cosine similarity is at least
/// `threshold` and the merged text fits in `max_size` characters.
///
/// Embedding failures are returned as-is; the orchestrator decides whether
/// to fall back to another strategy.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    embedder: EmbeddingGenerator,
    max_size: usize,
    threshold: f32,
}

/// A sentence-sized piece of the document.
struct Unit<'a> {
    text: std::borrow::Cow<'a, str>,
    paragraph: usize,
}

/// Units `[first, last]` merged into one chunk.
struct Group {
    first: usize,
    last: usize,
    len: usize,
    similarities: Vec<f32>,
}

impl SemanticChunker {
    pub fn new(embedder: EmbeddingGenerator, max_size: usize, threshold: f32) -> Self {
        Self { embedder, max_size: max_size.max(1), threshold }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn units<'a>(&self, paragraphs: &'a [String]) -> Vec<Unit<'a>> {
        let mut units = Vec::new();
        for (paragraph, text) in paragraphs.iter().enumerate() {
            for sentence in split_sentences(text) {
                if char_len(sentence) <= self.max_size {
                    units.push(Unit { text: sentence.into(), paragraph });
                } else {
                    units.extend(
                        split_by_size(sentence, self.max_size)
                            .into_iter()
                            .map(|piece| Unit { text: piece.into(), paragraph }),
                    );
                }
            }
        }
        units
    }

    fn group(&self, units: &[Unit<'_>], similarities: &[f32]) -> Vec<Group> {
        let mut groups = Vec::new();
        let mut current = Group { first: 0, last: 0, len: char_len(&units[0].text), similarities: Vec::new() };

        for i in 1..units.len() {
            let similarity = similarities[i - 1];
            let merged_len = current.len + separator(&units[i - 1], &units[i]).len() + char_len(&units[i].text);

            if similarity >= self.threshold && merged_len <= self.max_size {
                current.last = i;
                current.len = merged_len;
                current.similarities.push(similarity);
            } else {
                let next = Group { first: i, last: i, len: char_len(&units[i].text), similarities: Vec::new() };
                groups.push(std::mem::replace(&mut current, next));
            }
        }
        groups.push(current);
        groups
    }

    /// Mean similarity inside the group. A single unit scores 1.0 when a
    /// topic shift ended it, otherwise its similarity to the next unit.
    fn confidence(&self, group: &Group, similarities: &[f32]) -> f32 {
        if !group.similarities.is_empty() {
            let mean = group.similarities.iter().sum::<f32>() / group.similarities.len() as f32;
            return mean.clamp(0.0, 1.0);
        }
        match similarities.get(group.last) {
            Some(&next) if next >= self.threshold => next.clamp(0.0, 1.0),
            _ => 1.0,
        }
    }
}

fn separator(previous: &Unit<'_>, next: &Unit<'_>) -> &'static str {
    if previous.paragraph == next.paragraph { " " } else { "\n\n" }
}

fn join_units(units: &[Unit<'_>]) -> String {
    let mut text = String::new();
    for (i, unit) in units.iter().enumerate() {
        if i > 0 {
            text.push_str(separator(&units[i - 1], unit));
        }
        text.push_str(&unit.text);
    }
    text
}

#[async_trait]
impl Chunker for SemanticChunker {
    fn strategy(&self) -> ChunkingStrategy {
        ChunkingStrategy::Semantic
    }

    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        validate_text(&document.text)?;

        let paragraphs = split_paragraphs(&document.text);
        let units = self.units(&paragraphs);

        if units.len() == 1 {
            return Ok(vec![Chunk::new(document, self.strategy(), 0, units[0].text.to_string(), 1.0)]);
        }

        let texts: Vec<&str> = units.iter().map(|unit| unit.text.as_ref()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let similarities: Vec<f32> =
            vectors.windows(2).map(|pair| cosine_similarity(&pair[0], &pair[1])).collect();

        let groups = self.group(&units, &similarities);
        debug!(units = units.len(), chunks = groups.len(), threshold = self.threshold, "semantic grouping");

        Ok(groups
            .iter()
            .enumerate()
            .map(|(sequence, group)| {
                let text = join_units(&units[group.first..=group.last]);
                let confidence = self.confidence(group, &similarities);
                Chunk::new(document, self.strategy(), sequence, text, confidence)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::error::VaultError;
    use crate::hash::HashEmbeddingProvider;
    use crate::retry::RetryPolicy;

    struct DownProvider;

    #[async_trait]
    impl EmbeddingProvider for DownProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(VaultError::EmbeddingUnavailable { provider: "down".into(), message: "offline".into() })
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    fn chunker(max_size: usize) -> SemanticChunker {
        let embedder = EmbeddingGenerator::new(Arc::new(HashEmbeddingProvider::default()));
        SemanticChunker::new(embedder, max_size, 0.35)
    }

    #[tokio::test]
    async fn topic_shift_starts_a_new_chunk() {
        let doc = Document::new(
            "Alpha beta gamma delta apple. Alpha beta gamma delta banana. Alpha beta gamma delta cherry. \
             Omega sigma tau rho kiwi. Omega sigma tau rho lime.",
        );
        let chunks = chunker(1000).chunk(&doc).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.ends_with("cherry."));
        assert!(chunks[1].text.starts_with("Omega"));
        assert!(chunks.iter().all(|c| c.confidence >= 0.35 && c.strategy == ChunkingStrategy::Semantic));
    }

    #[tokio::test]
    async fn merged_chunks_respect_max_size() {
        let sentence = "Alpha beta gamma delta epsilon zeta eta theta.";
        let doc = Document::new(vec![sentence; 12].join(" "));
        let chunks = chunker(120).chunk(&doc).await.unwrap();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 120));
    }

    #[tokio::test]
    async fn paragraph_breaks_are_kept_inside_a_chunk() {
        let doc = Document::new("Alpha beta gamma delta one.\n\nAlpha beta gamma delta two.");
        let chunks = chunker(1000).chunk(&doc).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Alpha beta gamma delta one.\n\nAlpha beta gamma delta two.");
    }

    #[tokio::test]
    async fn single_sentence_skips_embedding() {
        let embedder = EmbeddingGenerator::new(Arc::new(DownProvider)).with_retry_policy(RetryPolicy::none());
        let chunks = SemanticChunker::new(embedder, 1000, 0.35)
            .chunk(&Document::new("Only one sentence here."))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn embedding_failure_is_returned() {
        let embedder = EmbeddingGenerator::new(Arc::new(DownProvider)).with_retry_policy(RetryPolicy::none());
        let err = SemanticChunker::new(embedder, 1000, 0.35)
            .chunk(&Document::new("First sentence. Second sentence."))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::EmbeddingUnavailable { .. }));
    }
}
