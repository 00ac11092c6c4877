use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int64Type};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::{debug, info};

use reqres_core::error::{Error, Result};
use reqres_core::traits::DenseIndex;
use reqres_core::types::{ranked, Candidate, Chunk, ChunkId, ChunkMeta, DocumentFormat, EmbeddedChunk};

use crate::schema::chunk_schema;
use crate::table::{ensure_table, get_meta, open_db, set_meta, sql_quote};

const EMBEDDER_KEY: &str = "embedder_id";

pub struct VectorStore {
    table: Table,
    dim: i32,
}

impl VectorStore {
    /// Opens (or creates) `table_name` under `db_dir` for vectors of `embedder_id`.
    ///
    /// Fails with [`Error::EmbedderMismatch`] when the table was built by another embedder;
    /// mixing vector spaces would make similarities meaningless.
    pub async fn open(db_dir: &Path, table_name: &str, embedder_id: &str, dim: usize) -> Result<Self> {
        let dim = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dimension {dim} is too large")))?;
        std::fs::create_dir_all(db_dir).map_err(Error::index)?;
        let db = open_db(&db_dir.to_string_lossy()).await?;
        let meta_table = format!("{table_name}_meta");
        match get_meta(&db, &meta_table, EMBEDDER_KEY).await? {
            Some(stored) if stored != embedder_id => {
                return Err(Error::EmbedderMismatch { stored, active: embedder_id.to_string() });
            }
            Some(_) => {}
            None => set_meta(&db, &meta_table, EMBEDDER_KEY, embedder_id).await?,
        }
        ensure_table(&db, table_name, chunk_schema(dim)).await?;
        let table = db.open_table(table_name).execute().await.map_err(Error::index)?;
        info!(table = table_name, embedder = embedder_id, "vector store ready");
        Ok(Self { table, dim })
    }

    fn to_record_batch(&self, chunks: &[EmbeddedChunk]) -> Result<RecordBatch> {
        let expected = usize::try_from(self.dim).unwrap_or(0);
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != expected) {
            return Err(Error::IndexUnavailable(format!("chunk {} has {} dims, expected {expected}", bad.chunk.id, bad.embedding.len())));
        }
        let mut ids = Vec::new(); let mut sources = Vec::new(); let mut formats = Vec::new(); let mut texts = Vec::new();
        let mut pages = Vec::new(); let mut sections = Vec::new(); let mut rules = Vec::new(); let mut ordinals = Vec::new();
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
        for EmbeddedChunk { chunk, embedding } in chunks {
            ids.push(chunk.id.clone()); sources.push(chunk.source.clone()); formats.push(chunk.format.as_str()); texts.push(chunk.text.clone());
            pages.push(chunk.meta.page.clone()); sections.push(chunk.meta.section.clone()); rules.push(chunk.meta.rule_name.clone());
            ordinals.push(i64::try_from(chunk.ordinal).unwrap_or(i64::MAX));
            vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(chunk_schema(self.dim), vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(formats)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(pages)),
            Arc::new(StringArray::from(sections)),
            Arc::new(StringArray::from(rules)),
            Arc::new(Int64Array::from(ordinals)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, self.dim)),
        ])
        .map_err(Error::index)
    }
}

#[async_trait]
impl DenseIndex for VectorStore {
    async fn upsert_source(&self, source: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let batch = self.to_record_batch(chunks)?;
        self.table.delete(&format!("source = {}", sql_quote(source))).await.map_err(Error::index)?;
        if batch.num_rows() > 0 {
            let schema = batch.schema();
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
            self.table.add(reader).execute().await.map_err(Error::index)?;
        }
        debug!(source, chunks = chunks.len(), "vector store upserted");
        Ok(())
    }

    async fn remove_all(&self) -> Result<()> {
        self.table.delete("id IS NOT NULL").await.map_err(Error::index)?;
        Ok(())
    }

    /// Exact cosine search. The whole table is scored so that equal similarities
    /// are ordered by chunk id rather than by storage layout.
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let total = self.count().await?;
        if limit == 0 || total == 0 { return Ok(Vec::new()); }
        let mut stream = self
            .table
            .vector_search(query_vec.to_vec())
            .map_err(Error::index)?
            .distance_type(DistanceType::Cosine)
            .limit(total)
            .execute()
            .await
            .map_err(Error::index)?;
        let mut hits: Vec<(ChunkId, f32)> = Vec::with_capacity(total);
        while let Some(batch) = stream.try_next().await.map_err(Error::index)? {
            let ids = string_column(&batch, "id")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| Error::IndexUnavailable("_distance column missing".into()))?;
            for i in 0..batch.num_rows() {
                let d = distances.value(i);
                let similarity = if d.is_finite() { 1.0 - d } else { 0.0 };
                hits.push((ids.value(i).to_string(), similarity));
            }
        }
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(ranked(hits))
    }

    async fn fetch(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        if ids.is_empty() { return Ok(Vec::new()); }
        let list = ids.iter().map(|id| sql_quote(id)).collect::<Vec<_>>().join(", ");
        let mut stream = self
            .table
            .query()
            .only_if(format!("id IN ({list})"))
            .execute()
            .await
            .map_err(Error::index)?;
        let mut found: HashMap<ChunkId, Chunk> = HashMap::with_capacity(ids.len());
        while let Some(batch) = stream.try_next().await.map_err(Error::index)? {
            for chunk in chunks_from_batch(&batch)? { found.insert(chunk.id.clone(), chunk); }
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn source_chunks(&self, source: &str) -> Result<Vec<EmbeddedChunk>> {
        let mut stream = self
            .table
            .query()
            .only_if(format!("source = {}", sql_quote(source)))
            .execute()
            .await
            .map_err(Error::index)?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::index)? {
            let vectors = batch
                .column_by_name("vector")
                .and_then(|c| c.as_fixed_size_list_opt())
                .ok_or_else(|| Error::IndexUnavailable("vector column missing".into()))?;
            for (i, chunk) in chunks_from_batch(&batch)?.into_iter().enumerate() {
                let row = vectors.value(i);
                let embedding = row
                    .as_primitive_opt::<Float32Type>()
                    .ok_or_else(|| Error::IndexUnavailable(format!("vector of {} is not f32", chunk.id)))?
                    .values()
                    .to_vec();
                out.push(EmbeddedChunk { chunk, embedding });
            }
        }
        out.sort_by_key(|e| e.chunk.ordinal);
        Ok(out)
    }

    async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(Error::index)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::IndexUnavailable(format!("{name} column missing")))
}

fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<Chunk>> {
    let ids = string_column(batch, "id")?;
    let sources = string_column(batch, "source")?;
    let formats = string_column(batch, "format")?;
    let texts = string_column(batch, "text")?;
    let pages = string_column(batch, "page")?;
    let sections = string_column(batch, "section")?;
    let rules = string_column(batch, "rule_name")?;
    let ordinals = batch
        .column_by_name("ordinal")
        .and_then(|c| c.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| Error::IndexUnavailable("ordinal column missing".into()))?;
    let optional = |col: &StringArray, i: usize| (!col.is_null(i)).then(|| col.value(i).to_string());
    Ok((0..batch.num_rows())
        .map(|i| Chunk {
            id: ids.value(i).to_string(),
            source: sources.value(i).to_string(),
            format: DocumentFormat::parse(formats.value(i)),
            text: texts.value(i).to_string(),
            meta: ChunkMeta { page: optional(pages, i), section: optional(sections, i), rule_name: optional(rules, i) },
            ordinal: usize::try_from(ordinals.value(i)).unwrap_or(0),
        })
        .collect())
}
