use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

/// Chunk rows: text plus provenance, and the embedding as a fixed-size list.
pub fn chunk_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("format", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("page", DataType::Utf8, true),
        Field::new("section", DataType::Utf8, true),
        Field::new("rule_name", DataType::Utf8, true),
        Field::new("ordinal", DataType::Int64, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

pub fn meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}
