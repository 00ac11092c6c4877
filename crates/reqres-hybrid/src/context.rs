use std::collections::HashSet;

use reqres_core::types::{ChunkMeta, Evidence, RankedChunk};

const SEPARATOR: &str = "\n\n";

/// Context handed to the generator plus the evidence it was built from, in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub block: String,
    pub evidence: Vec<Evidence>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool { self.evidence.is_empty() }
}

/// Builds the context block from reranked chunks.
///
/// Duplicates are dropped, then at most `max_items` chunks are considered. Entries are
/// appended whole while the block stays within `max_total_chars`; the first entry that
/// would overflow ends assembly.
pub fn assemble(ranked: &[RankedChunk], max_items: usize, max_total_chars: usize) -> AssembledContext {
    let mut seen = HashSet::new();
    let mut out = AssembledContext::default();
    let mut used = 0usize;

    for item in ranked.iter().filter(|&r| seen.insert(r.chunk.id.as_str())).take(max_items) {
        let entry = format!("[{}] {}\n{}", out.evidence.len() + 1, attribution(&item.chunk.source, &item.chunk.meta), item.chunk.text);
        let cost = entry.chars().count() + if out.block.is_empty() { 0 } else { SEPARATOR.len() };
        if used + cost > max_total_chars { break; }
        if !out.block.is_empty() { out.block.push_str(SEPARATOR); }
        out.block.push_str(&entry);
        used += cost;
        out.evidence.push(Evidence {
            chunk_id: item.chunk.id.clone(),
            source: item.chunk.source.clone(),
            format: item.chunk.format,
            meta: item.chunk.meta.clone(),
            relevance_score: item.relevance_score,
            excerpt: item.chunk.text.clone(),
        });
    }
    out
}

/// `(source: rules.json, rule: R1)` style marker.
fn attribution(source: &str, meta: &ChunkMeta) -> String {
    let mut parts = vec![format!("source: {source}")];
    if let Some(page) = &meta.page { parts.push(format!("page: {page}")); }
    if let Some(section) = &meta.section { parts.push(format!("section: {section}")); }
    if let Some(rule) = &meta.rule_name { parts.push(format!("rule: {rule}")); }
    format!("({})", parts.join(", "))
}
