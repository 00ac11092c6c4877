use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery};
use tantivy::schema::{Field, Value};
use tantivy::tokenizer::{Token, TokenStream};
use tantivy::{doc, Index, IndexReader, IndexWriter, Order, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use reqres_core::error::{Error, Result};
use reqres_core::traits::SparseIndex;
use reqres_core::types::{ranked, Candidate, Chunk};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    source_field: Field,
    text_field: Field,
    seq_field: Field,
    next_seq: AtomicU64,
}

impl KeywordIndex {
    /// Opens the index stored in `index_dir`, creating an empty one on first use.
    pub fn open(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir).map_err(Error::index)?;
        let directory = MmapDirectory::open(index_dir).map_err(Error::index)?;
        let index = Index::open_or_create(directory, build_schema()).map_err(Error::index)?;
        Self::from_index(index)
    }

    pub fn in_memory() -> Result<Self> { Self::from_index(Index::create_in_ram(build_schema())) }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizer(&index);
        let schema = index.schema();
        let id_field = schema.get_field("id").map_err(Error::index)?;
        let source_field = schema.get_field("source").map_err(Error::index)?;
        let text_field = schema.get_field("text").map_err(Error::index)?;
        let seq_field = schema.get_field("seq").map_err(Error::index)?;
        let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(Error::index)?;
        let this = Self { index, reader, id_field, source_field, text_field, seq_field, next_seq: AtomicU64::new(0) };
        this.next_seq.store(this.max_seq()?.map_or(0, |s| s + 1), Ordering::SeqCst);
        Ok(this)
    }

    fn max_seq(&self) -> Result<Option<u64>> {
        let searcher = self.reader.searcher();
        let top = searcher
            .search(&AllQuery, &TopDocs::with_limit(1).order_by_u64_field("seq", Order::Desc))
            .map_err(Error::index)?;
        Ok(top.first().map(|(seq, _)| *seq))
    }

    fn writer(&self) -> Result<IndexWriter> {
        self.index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(Error::index)
    }

    fn commit(&self, mut writer: IndexWriter) -> Result<()> {
        writer.commit().map_err(Error::index)?;
        self.reader.reload().map_err(Error::index)
    }

    /// Query terms after the field's analyzer (lowercasing, stop words), deduplicated.
    fn query_terms(&self, query: &str) -> Result<Vec<Term>> {
        let mut analyzer = self.index.tokenizer_for_field(self.text_field).map_err(Error::index)?;
        let mut stream = analyzer.token_stream(query);
        let mut terms: Vec<Term> = Vec::new();
        let field = self.text_field;
        stream.process(&mut |token: &Token| {
            let term = Term::from_field_text(field, &token.text);
            if !terms.contains(&term) { terms.push(term); }
        });
        Ok(terms)
    }
}

impl SparseIndex for KeywordIndex {
    fn upsert_source(&self, source: &str, chunks: &[Chunk]) -> Result<()> {
        let mut writer = self.writer()?;
        writer.delete_term(Term::from_field_text(self.source_field, source));
        for c in chunks {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            writer
                .add_document(doc!(
                    self.id_field => c.id.clone(),
                    self.source_field => c.source.clone(),
                    self.text_field => c.text.clone(),
                    self.seq_field => seq,
                ))
                .map_err(Error::index)?;
        }
        self.commit(writer)?;
        debug!(source, chunks = chunks.len(), "keyword index committed");
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        let mut writer = self.writer()?;
        writer.delete_all_documents().map_err(Error::index)?;
        self.commit(writer)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        let searcher = self.reader.searcher();
        let total = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        if limit == 0 || total == 0 { return Ok(Vec::new()); }
        let terms = self.query_terms(query)?;
        if terms.is_empty() { return Ok(Vec::new()); }

        // Rank the full match set so ties at the cut-off resolve by insertion order.
        let q = BooleanQuery::new_multiterms_query(terms);
        let top_docs = searcher.search(&q, &TopDocs::with_limit(total)).map_err(Error::index)?;
        let mut hits: Vec<(String, f32, u64)> = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(Error::index)?;
            let id = doc.get_first(self.id_field).and_then(|v| v.as_str()).unwrap_or("").to_string();
            let seq = doc.get_first(self.seq_field).and_then(|v| v.as_u64()).unwrap_or(u64::MAX);
            hits.push((id, score, seq));
        }
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        hits.truncate(limit);
        Ok(ranked(hits.into_iter().map(|(id, score, _)| (id, score)).collect()))
    }

    fn count(&self) -> Result<usize> {
        Ok(usize::try_from(self.reader.searcher().num_docs()).unwrap_or(usize::MAX))
    }
}
