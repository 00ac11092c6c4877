//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i)
//!
//! Only ranks are used, so the retrievers' score scales never need normalising.

use std::collections::HashMap;

use reqres_core::types::{Candidate, ChunkId, FusedCandidate, RetrieverKind};

/// Fuses the dense and sparse rankings.
///
/// A chunk missing from one list contributes nothing for that list. Output is sorted by
/// fused score, then by the best rank the chunk reached in either list, then by chunk id.
pub fn fuse(dense: &[Candidate], sparse: &[Candidate], k: f64) -> Vec<FusedCandidate> {
    let mut by_id: HashMap<ChunkId, FusedCandidate> = HashMap::new();
    for (kind, list) in [(RetrieverKind::Dense, dense), (RetrieverKind::Sparse, sparse)] {
        for candidate in list {
            let entry = by_id.entry(candidate.chunk_id.clone()).or_insert_with(|| FusedCandidate {
                chunk_id: candidate.chunk_id.clone(),
                fused_score: 0.0,
                dense_rank: None,
                sparse_rank: None,
            });
            let slot = match kind {
                RetrieverKind::Dense => &mut entry.dense_rank,
                RetrieverKind::Sparse => &mut entry.sparse_rank,
            };
            // A chunk counts once per retriever.
            if slot.is_some() { continue; }
            *slot = Some(candidate.rank);
            entry.fused_score += 1.0 / (k + candidate.rank as f64);
        }
    }

    let mut fused: Vec<FusedCandidate> = by_id.into_values().collect();
    fused.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.best_rank().cmp(&b.best_rank()))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqres_core::types::ranked;
    use std::collections::HashSet;

    fn list(ids: &[&str]) -> Vec<Candidate> {
        ranked(ids.iter().enumerate().map(|(i, id)| ((*id).to_string(), 10.0 - i as f32)).collect())
    }

    #[test]
    fn scores_are_summed_reciprocal_ranks() {
        let fused = fuse(&list(&["a", "b"]), &list(&["b", "c"]), 60.0);
        let b = fused.iter().find(|f| f.chunk_id == "b").expect("b");
        assert!((b.fused_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert_eq!((b.dense_rank, b.sparse_rank), (Some(2), Some(1)));
        let c = fused.iter().find(|f| f.chunk_id == "c").expect("c");
        assert_eq!(c.dense_rank, None);
        assert!((c.fused_score - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn first_in_both_lists_wins() {
        let fused = fuse(&list(&["x", "y", "z"]), &list(&["x", "z", "w", "y"]), 60.0);
        assert_eq!(fused[0].chunk_id, "x");
        assert!(fused[1..].iter().all(|f| f.fused_score < fused[0].fused_score));
    }

    #[test]
    fn never_fabricates_or_duplicates_ids() {
        let dense = list(&["a", "b", "c"]);
        let sparse = list(&["d", "a"]);
        let fused = fuse(&dense, &sparse, 60.0);
        let inputs: HashSet<&str> = dense.iter().chain(&sparse).map(|c| c.chunk_id.as_str()).collect();
        let outputs: HashSet<&str> = fused.iter().map(|f| f.chunk_id.as_str()).collect();
        assert_eq!(inputs, outputs);
        assert_eq!(fused.len(), outputs.len());
    }

    #[test]
    fn exact_ties_are_ordered_by_chunk_id() {
        // Mirrored lists: equal scores and equal best ranks, so the id decides.
        let fused = fuse(&list(&["p", "q"]), &list(&["q", "p"]), 60.0);
        assert_eq!(fused[0].fused_score, fused[1].fused_score);
        assert_eq!(fused[0].chunk_id, "p");

        let single = fuse(&list(&["m"]), &list(&["l"]), 60.0);
        assert_eq!(single.iter().map(|f| f.chunk_id.as_str()).collect::<Vec<_>>(), vec!["l", "m"]);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(fuse(&[], &[], 60.0).is_empty());
        assert_eq!(fuse(&list(&["only"]), &[], 60.0).len(), 1);
    }

    #[test]
    fn larger_k_flattens_rank_influence() {
        let gap = |k: f64| {
            let fused = fuse(&list(&["a", "b", "c", "d", "e"]), &[], k);
            fused[0].fused_score / fused[4].fused_score
        };
        assert!(gap(1.0) > gap(60.0));
    }
}
