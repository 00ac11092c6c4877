use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reqres_core::classify::split_sentences;
use reqres_core::config::{AppConfig, ContextConfig, RerankConfig, RetrievalConfig};
use reqres_core::error::{Error, Result};
use reqres_core::traits::{AmbiguityClassifier, Generator, Reranker};
use reqres_core::types::{Chunk, ChunkId, Classification, Evidence, FusedCandidate, Label, Query, RankedChunk, ResolutionResult};

use crate::context::{assemble, AssembledContext};
use crate::fusion::fuse;
use crate::generation::Orchestrator;
use crate::knowledge_base::KnowledgeBase;
use crate::rerank::rerank;

/// Every intermediate ranking for one sentence.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub fused: Vec<FusedCandidate>,
    pub reranked: Vec<RankedChunk>,
    pub context: AssembledContext,
}

#[derive(Debug, Clone, Serialize)]
pub enum OutcomeStatus {
    /// Classified clear; not resolved.
    Clear,
    Resolved(ResolutionResult),
    /// Generation failed; the evidence gathered before the call is kept.
    Failed { error: String, evidence: Vec<Evidence> },
}

#[derive(Debug, Clone, Serialize)]
pub struct SentenceOutcome {
    pub sentence: String,
    pub classification: Classification,
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<SentenceOutcome>,
    pub submitted: usize,
    /// True when cancellation stopped the batch before every sentence was processed.
    pub cancelled: bool,
}

/// Per-sentence resolution over a shared knowledge base.
pub struct Pipeline {
    kb: Arc<KnowledgeBase>,
    reranker: Arc<dyn Reranker>,
    orchestrator: Orchestrator,
    retrieval: RetrievalConfig,
    rerank: RerankConfig,
    context: ContextConfig,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(kb: Arc<KnowledgeBase>, reranker: Arc<dyn Reranker>, generator: Arc<dyn Generator>, config: &AppConfig) -> Self {
        Self {
            kb,
            reranker,
            orchestrator: Orchestrator::from_config(generator, &config.generation),
            retrieval: config.retrieval.clone(),
            rerank: config.rerank.clone(),
            context: config.context.clone(),
            concurrency: config.batch.concurrency.max(1),
        }
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> { &self.kb }

    /// Dense and sparse search in parallel, then fusion, reranking and context assembly.
    pub async fn retrieve(&self, sentence: &str) -> Result<Retrieval> {
        let (dense, sparse) = tokio::join!(
            self.kb.search_dense(sentence, self.retrieval.dense_limit),
            self.kb.search_sparse(sentence, self.retrieval.sparse_limit),
        );
        let (dense, sparse) = (dense?, sparse?);
        let fused = fuse(&dense, &sparse, self.retrieval.rrf_k);

        let shortlist: Vec<ChunkId> = fused.iter().take(self.rerank.top_n_in).map(|f| f.chunk_id.clone()).collect();
        let chunks = self.kb.dense().fetch(&shortlist).await?;
        if chunks.len() < shortlist.len() {
            warn!(missing = shortlist.len() - chunks.len(), "fused candidates without a stored chunk");
        }
        let with_scores: Vec<(Chunk, f64)> = chunks
            .into_iter()
            .filter_map(|chunk| fused.iter().find(|f| f.chunk_id == chunk.id).map(|f| (chunk, f.fused_score)))
            .collect();

        let reranker = self.reranker.clone();
        let query = sentence.to_string();
        let (top_n_in, top_k_out) = (self.rerank.top_n_in, self.rerank.top_k_out);
        let reranked = tokio::task::spawn_blocking(move || rerank(reranker.as_ref(), &query, with_scores, top_n_in, top_k_out))
            .await
            .map_err(Error::model)??;

        let context = assemble(&reranked, self.context.max_items, self.context.max_total_chars);
        debug!(dense = dense.len(), sparse = sparse.len(), fused = fused.len(), reranked = reranked.len(), evidence = context.evidence.len(), "retrieved");
        Ok(Retrieval { fused, reranked, context })
    }

    /// Resolves one ambiguous sentence end to end.
    ///
    /// A generation failure yields [`OutcomeStatus::Failed`] carrying the evidence that was
    /// retrieved for the sentence; retrieval errors are returned as `Err`.
    pub async fn resolve(&self, query: &Query) -> Result<OutcomeStatus> {
        let retrieval = self.retrieve(&query.sentence).await?;
        match self.orchestrator.resolve(query, &retrieval.context).await {
            Ok(result) => Ok(OutcomeStatus::Resolved(result)),
            Err(e @ Error::Generation(_)) => {
                warn!(sentence = %query.sentence, error = %e, "generation failed");
                Ok(OutcomeStatus::Failed { error: e.to_string(), evidence: retrieval.context.evidence })
            }
            Err(e) => Err(e),
        }
    }

    /// Splits `text` into sentences and resolves them as a batch.
    pub async fn resolve_text(&self, text: &str, classifier: &dyn AmbiguityClassifier, cancel: &CancellationToken) -> Result<BatchReport> {
        self.resolve_batch(split_sentences(text), classifier, cancel).await
    }

    /// Classifies each sentence and resolves the ambiguous ones, up to `batch.concurrency` at a time.
    ///
    /// Generation failures are recorded against their sentence and the batch continues;
    /// classification or index failures abort it. Once `cancel` fires no further sentence is
    /// submitted and only the outcomes already computed are returned.
    pub async fn resolve_batch(&self, sentences: Vec<String>, classifier: &dyn AmbiguityClassifier, cancel: &CancellationToken) -> Result<BatchReport> {
        let submitted = sentences.len();
        let outcomes: Vec<SentenceOutcome> = stream::iter(sentences)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|sentence| self.process_sentence(sentence, classifier))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let cancelled = outcomes.len() < submitted;
        let resolved = outcomes.iter().filter(|o| matches!(o.status, OutcomeStatus::Resolved(_))).count();
        let failed = outcomes.iter().filter(|o| matches!(o.status, OutcomeStatus::Failed { .. })).count();
        info!(submitted, processed = outcomes.len(), resolved, failed, cancelled, "batch finished");
        Ok(BatchReport { outcomes, submitted, cancelled })
    }

    async fn process_sentence(&self, sentence: String, classifier: &dyn AmbiguityClassifier) -> Result<SentenceOutcome> {
        let classification = classifier.classify(&sentence)?;
        if classification.label == Label::Clear {
            return Ok(SentenceOutcome { sentence, classification, status: OutcomeStatus::Clear });
        }

        let query = Query::new(sentence.clone()).with_confidence(classification.confidence);
        let status = self.resolve(&query).await?;
        Ok(SentenceOutcome { sentence, classification, status })
    }
}
