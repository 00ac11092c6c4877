use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use reqres_core::config::ModelConfig;
use reqres_core::error::{Error, Result};
use reqres_core::traits::Reranker;
use reqres_core::types::{Chunk, RankedChunk};
use reqres_embed::CrossEncoderReranker;

/// Scores the first `top_n_in` candidates pairwise against `query` and keeps the best
/// `top_k_out`. `candidates` must be in fused order; equal relevance keeps that order.
pub fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<(Chunk, f64)>,
    top_n_in: usize,
    top_k_out: usize,
) -> Result<Vec<RankedChunk>> {
    let mut seen = HashSet::new();
    let shortlist: Vec<(Chunk, f64)> = candidates
        .into_iter()
        .filter(|(chunk, _)| seen.insert(chunk.id.clone()))
        .take(top_n_in)
        .collect();
    if shortlist.is_empty() { return Ok(Vec::new()); }

    let passages: Vec<&str> = shortlist.iter().map(|(chunk, _)| chunk.text.as_str()).collect();
    let scores = reranker.score_pairs(query, &passages)?;
    if scores.len() != shortlist.len() {
        return Err(Error::Model(format!("reranker returned {} scores for {} passages", scores.len(), shortlist.len())));
    }

    let mut ranked: Vec<RankedChunk> = shortlist
        .into_iter()
        .zip(scores)
        .map(|((chunk, fused_score), score)| RankedChunk {
            chunk,
            relevance_score: if score.is_nan() { f32::NEG_INFINITY } else { score },
            fused_score,
        })
        .collect();
    // sort_by is stable: equal scores stay in fused order.
    ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    ranked.truncate(top_k_out);
    debug!(reranker = reranker.id(), kept = ranked.len(), "reranked");
    Ok(ranked)
}

/// Lexical pairwise scorer: distinct query terms found in the passage, damped by
/// passage vocabulary size so focused passages outrank long ones.
#[derive(Debug, Clone, Default)]
pub struct TermOverlapReranker;

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

impl Reranker for TermOverlapReranker {
    fn id(&self) -> &str { "term-overlap" }

    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let query_terms = terms(query);
        Ok(passages
            .iter()
            .map(|passage| {
                let passage_terms = terms(passage);
                if passage_terms.is_empty() { return 0.0; }
                let hits = query_terms.intersection(&passage_terms).count() as f32;
                hits / (passage_terms.len() as f32).sqrt()
            })
            .collect())
    }
}

/// Builds the reranker selected by `models`.
pub fn load_reranker(models: &ModelConfig) -> Result<Arc<dyn Reranker>> {
    if models.use_term_overlap_reranker {
        info!("using term-overlap reranker");
        return Ok(Arc::new(TermOverlapReranker));
    }
    Ok(Arc::new(CrossEncoderReranker::load(Path::new(&models.reranker_dir), models.max_len)?))
}
