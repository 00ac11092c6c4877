use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Candidate, Chunk, ChunkId, Classification, EmbeddedChunk, GenerationRequest};

/// Deterministic text-to-vector mapping shared by ingestion and querying.
pub trait Embedder: Send + Sync {
    /// Stable identifier stored alongside the vector index (e.g. `bert:all-MiniLM-L6-v2:d384`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Keyword index. Ranking statistics are computed over the whole current corpus.
pub trait SparseIndex: Send + Sync {
    /// Replaces every chunk of `source` with `chunks` in one commit.
    fn upsert_source(&self, source: &str, chunks: &[Chunk]) -> Result<()>;
    fn remove_all(&self) -> Result<()>;
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>>;
    fn count(&self) -> Result<usize>;
}

/// Vector index that also serves as the chunk store.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Replaces every chunk of `source` with `chunks`.
    async fn upsert_source(&self, source: &str, chunks: &[EmbeddedChunk]) -> Result<()>;
    async fn remove_all(&self) -> Result<()>;
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Candidate>>;
    /// Looks chunks up by id; unknown ids are skipped.
    async fn fetch(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;
    /// Every stored chunk of `source` with its embedding, in ordinal order.
    async fn source_chunks(&self, source: &str) -> Result<Vec<EmbeddedChunk>>;
    async fn count(&self) -> Result<usize>;
}

/// Pairwise relevance model: scores `(query, passage)` jointly, higher is better.
pub trait Reranker: Send + Sync {
    fn id(&self) -> &str;
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// External text generator. Output is free text; nothing structured is parsed from it.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

pub trait AmbiguityClassifier: Send + Sync {
    fn classify(&self, sentence: &str) -> Result<Classification>;
}
