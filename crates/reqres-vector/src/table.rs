//! LanceDB connection and housekeeping helpers, including the key/value meta
//! table that records which embedder produced the stored vectors.
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::Schema;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

use reqres_core::error::{Error, Result};

use crate::schema::meta_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(Error::index)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    let names = conn.table_names().execute().await.map_err(Error::index)?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    conn.create_empty_table(name, schema).execute().await.map_err(Error::index)?;
    Ok(())
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_table(conn, table, meta_schema()).await?;
    let t = conn.open_table(table).execute().await.map_err(Error::index)?;
    let rb = RecordBatch::try_new(
        meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )
    .map_err(Error::index)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), meta_schema()));
    // key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await.map_err(Error::index)?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    let names = conn.table_names().execute().await.map_err(Error::index)?;
    if !names.iter().any(|n| n == table) { return Ok(None); }
    let t = conn.open_table(table).execute().await.map_err(Error::index)?;
    let mut stream = t
        .query()
        .only_if(format!("key = {}", sql_quote(key)))
        .execute()
        .await
        .map_err(Error::index)?;
    while let Some(batch) = stream.try_next().await.map_err(Error::index)? {
        if batch.num_rows() == 0 { continue; }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| Error::IndexUnavailable("meta.value column missing".into()))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

/// SQL string literal for lance filter expressions.
pub fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
