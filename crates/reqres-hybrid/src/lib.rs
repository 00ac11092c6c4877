//! reqres-hybrid
//!
//! The resolution core: a knowledge base that keeps the keyword and vector indices in
//! step, reciprocal-rank fusion of their rankings, pairwise reranking, budgeted context
//! assembly and grounded generation, wired together per sentence and per batch.

pub mod context;
pub mod fusion;
pub mod generation;
pub mod knowledge_base;
pub mod pipeline;
pub mod rerank;

pub use context::{assemble, AssembledContext};
pub use fusion::fuse;
pub use generation::{Orchestrator, OpenAiGenerator};
pub use knowledge_base::{IngestReport, KnowledgeBase};
pub use pipeline::{BatchReport, OutcomeStatus, Pipeline, Retrieval, SentenceOutcome};
pub use rerank::{load_reranker, rerank, TermOverlapReranker};
