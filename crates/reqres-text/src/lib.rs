//! reqres-text
//!
//! Tantivy-backed keyword index. BM25 statistics are computed over the whole
//! committed corpus, so rankings shift as knowledge sources are added.

pub mod index;
pub mod tantivy_utils;

pub use index::KeywordIndex;
