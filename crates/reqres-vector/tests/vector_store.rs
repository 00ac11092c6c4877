use reqres_core::traits::DenseIndex;
use reqres_core::types::{Chunk, ChunkMeta, DocumentFormat, EmbeddedChunk};
use reqres_core::Error;
use reqres_vector::VectorStore;
use tempfile::TempDir;

const EMBEDDER: &str = "test:d3";

fn embedded(source: &str, ordinal: usize, text: &str, embedding: [f32; 3]) -> EmbeddedChunk {
    EmbeddedChunk {
        chunk: Chunk {
            id: format!("{source}:{ordinal}"),
            source: source.to_string(),
            format: DocumentFormat::Rule,
            text: text.to_string(),
            meta: ChunkMeta { page: None, section: Some("Quantifiers".into()), rule_name: Some("R1".into()) },
            ordinal,
        },
        embedding: embedding.to_vec(),
    }
}

#[tokio::test]
async fn empty_store_searches_to_nothing() {
    let tmp = TempDir::new().expect("tmp");
    let store = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("open");
    assert_eq!(store.count().await.expect("count"), 0);
    assert!(store.search(&[1.0, 0.0, 0.0], 5).await.expect("search").is_empty());
    assert!(store.fetch(&["missing".to_string()]).await.expect("fetch").is_empty());
}

#[tokio::test]
async fn cosine_ranking_with_id_tie_break_and_limit() {
    let tmp = TempDir::new().expect("tmp");
    let store = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("open");
    store
        .upsert_source(
            "b.json",
            &[
                embedded("b.json", 0, "same direction", [1.0, 0.0, 0.0]),
                embedded("b.json", 1, "orthogonal", [0.0, 1.0, 0.0]),
            ],
        )
        .await
        .expect("upsert b");
    store
        .upsert_source("a.json", &[embedded("a.json", 0, "same direction too", [1.0, 0.0, 0.0]), embedded("a.json", 1, "close", [1.0, 0.2, 0.0])])
        .await
        .expect("upsert a");

    let hits = store.search(&[1.0, 0.0, 0.0], 3).await.expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["a.json:0", "b.json:0", "a.json:1"]);
    assert_eq!(hits.iter().map(|h| h.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    for pair in hits.windows(2) { assert!(pair[0].score >= pair[1].score); }
}

#[tokio::test]
async fn reupsert_replaces_and_fetch_keeps_metadata() {
    let tmp = TempDir::new().expect("tmp");
    let store = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("open");
    let chunks = vec![embedded("rules.json", 0, "Avoid fast.", [1.0, 0.0, 0.0]), embedded("rules.json", 1, "Avoid easy.", [0.0, 1.0, 0.0])];
    store.upsert_source("rules.json", &chunks).await.expect("first");
    store.upsert_source("rules.json", &chunks).await.expect("second");
    assert_eq!(store.count().await.expect("count"), 2);

    let fetched = store.fetch(&["rules.json:1".to_string(), "nope".to_string(), "rules.json:0".to_string()]).await.expect("fetch");
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0], chunks[1].chunk);
    assert_eq!(fetched[1].meta.rule_name.as_deref(), Some("R1"));
    assert_eq!(fetched[1].format, DocumentFormat::Rule);

    store.remove_all().await.expect("reset");
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn quotes_in_sources_are_escaped() {
    let tmp = TempDir::new().expect("tmp");
    let store = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("open");
    let source = "o'brien.txt";
    store.upsert_source(source, &[embedded(source, 0, "text", [1.0, 1.0, 0.0])]).await.expect("upsert");
    store.upsert_source(source, &[embedded(source, 0, "text", [1.0, 1.0, 0.0])]).await.expect("upsert again");
    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn wrong_dimension_is_rejected_before_writing() {
    let tmp = TempDir::new().expect("tmp");
    let store = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("open");
    let mut bad = embedded("a.txt", 0, "text", [1.0, 0.0, 0.0]);
    bad.embedding.push(0.5);
    assert!(store.upsert_source("a.txt", &[bad]).await.is_err());
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn reopening_with_another_embedder_fails() {
    let tmp = TempDir::new().expect("tmp");
    {
        let store = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("open");
        store.upsert_source("a.txt", &[embedded("a.txt", 0, "text", [1.0, 0.0, 0.0])]).await.expect("upsert");
    }
    let same = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("reopen");
    assert_eq!(same.count().await.expect("count"), 1);

    let err = VectorStore::open(tmp.path(), "chunks", "other:d3", 3).await.err().expect("mismatch");
    assert!(matches!(err, Error::EmbedderMismatch { ref stored, ref active } if stored == EMBEDDER && active == "other:d3"));
}

#[tokio::test]
async fn source_chunks_returns_embeddings_in_ordinal_order() {
    let tmp = TempDir::new().expect("tmp");
    let store = VectorStore::open(tmp.path(), "chunks", EMBEDDER, 3).await.expect("open");
    let rules = vec![embedded("rules.json", 1, "Avoid easy.", [0.0, 1.0, 0.0]), embedded("rules.json", 0, "Avoid fast.", [1.0, 0.0, 0.5])];
    store.upsert_source("rules.json", &rules).await.expect("upsert rules");
    store.upsert_source("other.json", &[embedded("other.json", 0, "Unrelated.", [0.0, 0.0, 1.0])]).await.expect("upsert other");

    let stored = store.source_chunks("rules.json").await.expect("chunks");
    assert_eq!(stored, vec![rules[1].clone(), rules[0].clone()]);
    assert!(store.source_chunks("absent.json").await.expect("absent").is_empty());

    store.upsert_source("rules.json", &stored).await.expect("restore");
    assert_eq!(store.count().await.expect("count"), 3);
}
