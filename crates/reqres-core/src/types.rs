//! Domain types shared by the indexer, the retrievers and the resolution pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;

/// Kind of knowledge a source carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Standard,
    Glossary,
    Rule,
    Template,
    Custom,
}

impl DocumentFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Glossary => "glossary",
            Self::Rule => "rule",
            Self::Template => "template",
            Self::Custom => "custom",
        }
    }

    /// Unknown tags read back from storage degrade to `Custom`.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "standard" => Self::Standard,
            "glossary" => Self::Glossary,
            "rule" => Self::Rule,
            "template" => Self::Template,
            _ => Self::Custom,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Optional provenance carried from the source into every chunk cut from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub page: Option<String>,
    pub section: Option<String>,
    pub rule_name: Option<String>,
}

/// A block of source text that is segmented on its own, never merged with a neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSection {
    pub text: String,
    pub meta: ChunkMeta,
}

/// A named knowledge source. `source` is the stable identity used for re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub format: DocumentFormat,
    pub sections: Vec<DocumentSection>,
}

impl Document {
    pub fn from_text(source: impl Into<String>, format: DocumentFormat, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            format,
            sections: vec![DocumentSection { text: text.into(), meta: ChunkMeta::default() }],
        }
    }
}

/// The atomic retrievable unit.
///
/// - `id`: `"{source}:{ordinal}:{content hash}"`, stable while the content is unchanged
/// - `ordinal`: position within the parent document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub format: DocumentFormat,
    pub text: String,
    pub meta: ChunkMeta,
    pub ordinal: usize,
}

/// A chunk paired with the vector the active embedder produced for its text.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Indicates which retriever produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RetrieverKind {
    Dense,
    Sparse,
}

/// One entry of a single retriever's ranking.
///
/// `score` is retriever-specific and only comparable within one list; `rank`
/// is 1-based and is the only value comparable across retrievers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub rank: usize,
}

/// Assigns 1-based ranks to an already ordered `(id, score)` list.
pub fn ranked(scored: Vec<(ChunkId, f32)>) -> Vec<Candidate> {
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (chunk_id, score))| Candidate { chunk_id, score, rank: i + 1 })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub chunk_id: ChunkId,
    pub fused_score: f64,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
}

impl FusedCandidate {
    /// Smallest rank this chunk reached in either retriever.
    pub fn best_rank(&self) -> usize {
        match (self.dense_rank, self.sparse_rank) {
            (Some(d), Some(s)) => d.min(s),
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => usize::MAX,
        }
    }
}

/// A fused candidate after pairwise relevance scoring, with its chunk resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub relevance_score: f32,
    pub fused_score: f64,
}

/// A cited piece of supporting material. Always maps to exactly one ingested chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub chunk_id: ChunkId,
    pub source: String,
    pub format: DocumentFormat,
    pub meta: ChunkMeta,
    pub relevance_score: f32,
    pub excerpt: String,
}

/// An ambiguous requirement sentence. `confidence` is display metadata only.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sentence: String,
    pub confidence: Option<f32>,
}

impl Query {
    pub fn new(sentence: impl Into<String>) -> Self { Self { sentence: sentence.into(), confidence: None } }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// What the generation oracle is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub instructions: String,
    /// `None` for the ungrounded fallback.
    pub context: Option<String>,
    pub target_sentence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub original_sentence: String,
    pub confidence: Option<f32>,
    pub rewrite_text: String,
    pub evidence: Vec<Evidence>,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Clear,
    Ambiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    pub confidence: f32,
}
