use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "requirement_text";

/// Function words and modal verbs. Modals carry no topical signal: nearly every
/// requirement contains "shall" or "should".
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its",
    "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they",
    "them", "their", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what", "which",
    "who", "whom", "whose", "can", "could", "should", "would", "may", "might", "must", "shall", "do",
    "does", "did", "have", "had", "having",
];

/// Tokens longer than this (hashes, URLs, base64 blobs) are not indexed.
const MAX_TOKEN_LEN: usize = 40;

pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("source", STRING | STORED);
    let indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
    builder.add_text_field("text", TextOptions::default().set_indexing_options(indexing).set_stored());
    // Insertion sequence, used to break score ties earliest-first.
    builder.add_u64_field("seq", INDEXED | STORED | FAST);
    builder.build()
}

pub fn register_tokenizer(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOP_WORDS.iter().map(|w| (*w).to_string())))
        .build();
    index.tokenizers().register(TOKENIZER_NAME, analyzer);
}
