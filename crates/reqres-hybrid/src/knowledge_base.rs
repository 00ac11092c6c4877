use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use reqres_core::config::{AppConfig, ChunkingConfig};
use reqres_core::error::{Error, Result};
use reqres_core::segment::Segmenter;
use reqres_core::traits::{DenseIndex, Embedder, SparseIndex};
use reqres_core::types::{Candidate, ChunkId, Document, EmbeddedChunk};
use reqres_text::KeywordIndex;
use reqres_vector::VectorStore;

/// The shared index pair plus the embedder that populated it.
///
/// Created empty or loaded from disk at startup, mutated only by [`KnowledgeBase::ingest`]
/// (serialised per instance) and emptied only by [`KnowledgeBase::reset`]. Searches take
/// no lock.
pub struct KnowledgeBase {
    sparse: Arc<dyn SparseIndex>,
    dense: Arc<dyn DenseIndex>,
    embedder: Arc<dyn Embedder>,
    segmenter: Segmenter,
    write_lock: Mutex<()>,
}

/// Outcome of a multi-document ingestion.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// `(source, chunk count)` per committed document.
    pub ingested: Vec<(String, usize)>,
    /// Documents that were skipped, one `Error::Ingestion` each.
    pub failed: Vec<Error>,
}

impl KnowledgeBase {
    pub fn new(sparse: Arc<dyn SparseIndex>, dense: Arc<dyn DenseIndex>, embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self { sparse, dense, embedder, segmenter: Segmenter::new(chunking), write_lock: Mutex::new(()) }
    }

    /// Opens the persisted tantivy and LanceDB indices named in `config`.
    pub async fn open(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let sparse = KeywordIndex::open(Path::new(&config.data.text_index_dir))?;
        let dense = VectorStore::open(Path::new(&config.data.vector_db_dir), &config.data.vector_table, embedder.id(), embedder.dim()).await?;
        Ok(Self::new(Arc::new(sparse), Arc::new(dense), embedder, config.chunking.clone()))
    }

    pub fn dense(&self) -> &Arc<dyn DenseIndex> { &self.dense }

    /// Segments, embeds and writes one document, replacing any earlier version of its source.
    ///
    /// All segments are embedded before anything is written, so an embedding failure leaves
    /// the indices untouched. If a write fails, both indices keep the previous version.
    pub async fn ingest(&self, doc: &Document) -> Result<Vec<ChunkId>> {
        let _guard = self.write_lock.lock().await;
        let chunks = self.segmenter.segment(doc);
        if chunks.is_empty() {
            return Err(Error::ingestion(&doc.source, "document yielded no segments"));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedder = self.embedder.clone();
        let embeddings = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| Error::ingestion(&doc.source, e))?
            .map_err(|e| Error::ingestion(&doc.source, e))?;
        if embeddings.len() != chunks.len() || embeddings.iter().any(|e| e.len() != self.embedder.dim()) {
            return Err(Error::ingestion(&doc.source, "embedder returned vectors of the wrong shape"));
        }

        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();
        let embedded: Vec<EmbeddedChunk> = chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect();
        // Previous version of the source, restored on the vector side if either write fails.
        // The keyword side needs no snapshot: a failed upsert never commits.
        let previous = self.dense.source_chunks(&doc.source).await?;
        if let Err(e) = self.dense.upsert_source(&doc.source, &embedded).await {
            self.restore_dense(&doc.source, &previous).await;
            return Err(e);
        }

        let sparse = self.sparse.clone();
        let source = doc.source.clone();
        let written = tokio::task::spawn_blocking(move || sparse.upsert_source(&source, &chunks))
            .await
            .map_err(Error::index)
            .and_then(|r| r);
        if let Err(e) = written {
            self.restore_dense(&doc.source, &previous).await;
            return Err(e);
        }

        info!(source = %doc.source, chunks = ids.len(), "ingested");
        Ok(ids)
    }

    async fn restore_dense(&self, source: &str, previous: &[EmbeddedChunk]) {
        match self.dense.upsert_source(source, previous).await {
            Ok(()) => debug!(source, chunks = previous.len(), "vector side restored"),
            Err(e) => warn!(source, error = %e, "vector rollback failed"),
        }
    }

    /// Ingests each document in turn. Per-source failures (`Error::Ingestion`) are
    /// collected; any other error aborts. `on_done` is called after every document.
    pub async fn ingest_all<F>(&self, docs: Vec<Result<Document>>, mut on_done: F) -> Result<IngestReport>
    where
        F: FnMut(&str),
    {
        let mut report = IngestReport::default();
        for doc in docs {
            let outcome = match doc {
                Ok(doc) => self.ingest(&doc).await.map(|ids| (doc.source, ids.len())),
                Err(e) => Err(e),
            };
            match outcome {
                Ok((source, count)) => {
                    on_done(&source);
                    report.ingested.push((source, count));
                }
                Err(e @ Error::Ingestion { .. }) => {
                    warn!(error = %e, "skipping source");
                    if let Error::Ingestion { source_name, .. } = &e { on_done(source_name); }
                    report.failed.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        info!(ingested = report.ingested.len(), failed = report.failed.len(), "ingestion finished");
        Ok(report)
    }

    /// Removes every chunk from both indices.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.dense.remove_all().await?;
        let sparse = self.sparse.clone();
        tokio::task::spawn_blocking(move || sparse.remove_all()).await.map_err(Error::index)??;
        info!("knowledge base reset");
        Ok(())
    }

    pub async fn chunk_count(&self) -> Result<usize> { self.dense.count().await }

    /// BM25 ranking over the keyword index.
    pub async fn search_sparse(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        let sparse = self.sparse.clone();
        let query = query.to_string();
        let hits = tokio::task::spawn_blocking(move || sparse.search(&query, limit)).await.map_err(Error::index)??;
        debug!(hits = hits.len(), "sparse search");
        Ok(hits)
    }

    /// Cosine ranking of the query embedding against every stored chunk.
    pub async fn search_dense(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        let embedder = self.embedder.clone();
        let texts = vec![query.to_string()];
        let vector = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(Error::model)??
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("embedder returned no vector for the query".into()))?;
        let hits = self.dense.search(&vector, limit).await?;
        debug!(hits = hits.len(), "dense search");
        Ok(hits)
    }
}
