use std::collections::HashSet;

use reqres_core::traits::SparseIndex;
use reqres_core::types::{Chunk, ChunkMeta, DocumentFormat};
use reqres_text::KeywordIndex;
use tempfile::TempDir;

fn chunk(source: &str, ordinal: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("{source}:{ordinal}"),
        source: source.to_string(),
        format: DocumentFormat::Custom,
        text: text.to_string(),
        meta: ChunkMeta::default(),
        ordinal,
    }
}

#[test]
fn empty_index_returns_no_candidates() {
    let index = KeywordIndex::in_memory().expect("index");
    assert!(index.search("fast response", 10).expect("search").is_empty());
    assert_eq!(index.count().expect("count"), 0);
}

#[test]
fn ranks_by_bm25_without_duplicates_and_respects_limit() {
    let index = KeywordIndex::in_memory().expect("index");
    index
        .upsert_source(
            "a.txt",
            &[
                chunk("a.txt", 0, "Vague quantifiers such as fast or quick should be replaced with measurable thresholds."),
                chunk("a.txt", 1, "Response time is the interval between a request and the reply."),
                chunk("a.txt", 2, "Fast fast fast systems are fast."),
                chunk("a.txt", 3, "Passive voice hides the actor."),
            ],
        )
        .expect("upsert");

    let hits = index.search("The system should be fast.", 2).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, "a.txt:2");
    for pair in hits.windows(2) { assert!(pair[0].score >= pair[1].score); }
    let ids: HashSet<_> = hits.iter().map(|h| h.chunk_id.clone()).collect();
    assert_eq!(ids.len(), hits.len());
    assert_eq!(hits.iter().map(|h| h.rank).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn no_term_overlap_is_empty_not_error() {
    let index = KeywordIndex::in_memory().expect("index");
    index.upsert_source("a.txt", &[chunk("a.txt", 0, "Latency budget")]).expect("upsert");
    assert!(index.search("throughput", 5).expect("search").is_empty());
    // Stop words only.
    assert!(index.search("the should be", 5).expect("search").is_empty());
}

#[test]
fn equal_scores_break_ties_by_insertion_order() {
    let index = KeywordIndex::in_memory().expect("index");
    index.upsert_source("z.txt", &[chunk("z.txt", 0, "reliable storage")]).expect("upsert z");
    index.upsert_source("a.txt", &[chunk("a.txt", 0, "reliable storage")]).expect("upsert a");
    let hits = index.search("reliable", 5).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, "z.txt:0");
    assert_eq!(hits[1].chunk_id, "a.txt:0");
}

#[test]
fn upsert_replaces_existing_source_chunks() {
    let index = KeywordIndex::in_memory().expect("index");
    let chunks = [chunk("a.txt", 0, "alpha bravo"), chunk("a.txt", 1, "charlie delta")];
    index.upsert_source("a.txt", &chunks).expect("first");
    index.upsert_source("a.txt", &chunks).expect("second");
    assert_eq!(index.count().expect("count"), 2);
    index.upsert_source("b.txt", &[chunk("b.txt", 0, "alpha echo")]).expect("b");
    assert_eq!(index.count().expect("count"), 3);
    index.remove_all().expect("reset");
    assert_eq!(index.count().expect("count"), 0);
}

#[test]
fn persisted_index_survives_reopen() {
    let tmp = TempDir::new().expect("tmp");
    {
        let index = KeywordIndex::open(tmp.path()).expect("open");
        index.upsert_source("a.txt", &[chunk("a.txt", 0, "measurable thresholds")]).expect("upsert");
    }
    let index = KeywordIndex::open(tmp.path()).expect("reopen");
    assert_eq!(index.count().expect("count"), 1);
    let hits = index.search("thresholds", 5).expect("search");
    assert_eq!(hits[0].chunk_id, "a.txt:0");
    // New chunks continue the insertion sequence after reopen.
    index.upsert_source("b.txt", &[chunk("b.txt", 0, "measurable thresholds")]).expect("upsert b");
    let hits = index.search("thresholds", 5).expect("search");
    assert_eq!(hits[0].chunk_id, "a.txt:0");
}
