//! Strategy selection and dispatch.
//!
//! The [`ChunkingOrchestrator`] decides which [`ChunkingStrategy`] handles a
//! document (an explicit override, the [classifier](crate::classifier), or
//! the configured default), runs it, and falls back to context-aware
//! windows once if the chosen chunker fails.

use serde::Serialize;
use tracing::{debug, warn};

use crate::chunking::{
    Chunker, ChunkingStrategy, ContextAwareChunker, HierarchicalChunker, SemanticChunker, validate_text,
};
use crate::classifier::{StrategyDecision, classify};
use crate::config::VaultConfig;
use crate::document::{Chunk, Document};
use crate::embedding::EmbeddingGenerator;
use crate::error::{Result, VaultError};

/// Chunks produced for one document and how they were produced.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkingOutcome {
    pub chunks: Vec<Chunk>,
    /// The strategy that actually produced `chunks`.
    pub strategy_used: ChunkingStrategy,
    /// Mean confidence of the chunks.
    pub confidence: f32,
    /// Whether the first choice failed and context-aware windows were used instead.
    pub fallback_used: bool,
    /// The classifier's decision, when the strategy was picked dynamically.
    pub decision: Option<StrategyDecision>,
}

/// Picks a chunking strategy per document and runs it.
#[derive(Debug, Clone)]
pub struct ChunkingOrchestrator {
    config: VaultConfig,
    embedder: EmbeddingGenerator,
}

impl ChunkingOrchestrator {
    pub fn new(config: VaultConfig, embedder: EmbeddingGenerator) -> Self {
        Self { config, embedder }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Chunk `document`, using `strategy` when given.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Chunking`] for empty or binary text (never
    /// retried), or when both the chosen strategy and the context-aware
    /// fallback fail.
    pub async fn process(
        &self,
        document: &Document,
        strategy: Option<ChunkingStrategy>,
    ) -> Result<ChunkingOutcome> {
        validate_text(&document.text)?;

        let base = self.config.target_chunk_size;
        let (strategy, target, decision) = match strategy {
            Some(strategy) => (strategy, base, None),
            None if self.config.dynamic_classification => {
                let decision = classify(&document.text, &self.config);
                debug!(
                    document.id = %document.id,
                    strategy = %decision.strategy,
                    target_size = decision.target_size,
                    content_type = ?decision.content_type,
                    complexity = decision.complexity,
                    heading_count = decision.heading_count,
                    paragraph_count = decision.paragraph_count,
                    vocabulary_diversity = decision.vocabulary_diversity,
                    avg_sentence_words = decision.avg_sentence_words,
                    structural_ratio = decision.structural_ratio,
                    reason = decision.reason,
                    "strategy decision"
                );
                (decision.strategy, decision.target_size, Some(decision))
            }
            None => (self.config.default_strategy, base, None),
        };

        match self.run(strategy, target, document).await {
            Ok(chunks) => Ok(outcome(chunks, strategy, false, decision)),
            // Context-aware is the fallback itself; rerunning it on the same input fails the same way.
            Err(e) if strategy == ChunkingStrategy::ContextAware => Err(e),
            Err(e) => {
                warn!(
                    document.id = %document.id,
                    strategy = %strategy,
                    error = %e,
                    "chunking failed, falling back to context_aware"
                );
                let chunks = self
                    .run(ChunkingStrategy::ContextAware, base, document)
                    .await
                    .map_err(|fallback| {
                        VaultError::Chunking(format!(
                            "{strategy} failed ({e}) and context_aware fallback failed ({fallback})"
                        ))
                    })?;
                Ok(outcome(chunks, ChunkingStrategy::ContextAware, true, decision))
            }
        }
    }

    async fn run(&self, strategy: ChunkingStrategy, target: usize, document: &Document) -> Result<Vec<Chunk>> {
        let chunks = match strategy {
            ChunkingStrategy::Hierarchical => HierarchicalChunker::new(target).chunk(document).await?,
            ChunkingStrategy::ContextAware => {
                ContextAwareChunker::new(target, self.config.chunk_overlap_ratio).chunk(document).await?
            }
            ChunkingStrategy::Semantic => {
                SemanticChunker::new(self.embedder.clone(), target, self.config.semantic_similarity_threshold)
                    .chunk(document)
                    .await?
            }
        };
        if chunks.is_empty() {
            return Err(VaultError::Chunking(format!("{strategy} produced no chunks")));
        }
        Ok(chunks)
    }
}

fn outcome(
    chunks: Vec<Chunk>,
    strategy_used: ChunkingStrategy,
    fallback_used: bool,
    decision: Option<StrategyDecision>,
) -> ChunkingOutcome {
    let confidence = chunks.iter().map(|c| c.confidence).sum::<f32>() / chunks.len().max(1) as f32;
    ChunkingOutcome { chunks, strategy_used, confidence, fallback_used, decision }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::EmbeddingProvider;
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

    fn orchestrator(config: VaultConfig) -> ChunkingOrchestrator {
        ChunkingOrchestrator::new(config, EmbeddingGenerator::new(Arc::new(HashEmbeddingProvider::default())))
    }

    #[tokio::test]
    async fn explicit_strategy_skips_classification() {
        let doc = Document::new("# Title\n\nBody text.");
        let outcome = orchestrator(VaultConfig::default())
            .process(&doc, Some(ChunkingStrategy::ContextAware))
            .await
            .unwrap();
        assert_eq!(outcome.strategy_used, ChunkingStrategy::ContextAware);
        assert!(outcome.decision.is_none());
        assert!(!outcome.fallback_used);
    }

    #[tokio::test]
    async fn dynamic_classification_records_decision() {
        let doc = Document::new("# Title\n\nBody text.\n\n## Part\n\nMore text.");
        let outcome = orchestrator(VaultConfig::default()).process(&doc, None).await.unwrap();
        assert_eq!(outcome.strategy_used, ChunkingStrategy::Hierarchical);
        assert_eq!(outcome.decision.unwrap().strategy, ChunkingStrategy::Hierarchical);
        assert!((outcome.confidence - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn disabled_classification_uses_default_strategy() {
        let config = VaultConfig::builder()
            .dynamic_classification(false)
            .default_strategy(ChunkingStrategy::Semantic)
            .build()
            .unwrap();
        let outcome = orchestrator(config).process(&Document::new("One. Two."), None).await.unwrap();
        assert_eq!(outcome.strategy_used, ChunkingStrategy::Semantic);
    }

    #[tokio::test]
    async fn semantic_failure_falls_back_to_context_aware() {
        let embedder = EmbeddingGenerator::new(Arc::new(DownProvider)).with_retry_policy(RetryPolicy::none());
        let orchestrator = ChunkingOrchestrator::new(VaultConfig::default(), embedder);
        let outcome = orchestrator
            .process(&Document::new("First sentence. Second sentence."), Some(ChunkingStrategy::Semantic))
            .await
            .unwrap();

        assert!(outcome.fallback_used);
        assert_eq!(outcome.strategy_used, ChunkingStrategy::ContextAware);
        assert!(!outcome.chunks.is_empty());
        assert!(outcome.chunks.iter().all(|c| c.strategy == ChunkingStrategy::ContextAware));
    }

    #[tokio::test]
    async fn malformed_input_is_rejected_before_dispatch() {
        let err = orchestrator(VaultConfig::default())
            .process(&Document::new("   "), Some(ChunkingStrategy::Semantic))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Chunking(_)));
    }
}
