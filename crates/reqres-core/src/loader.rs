//! Turns knowledge files into [`Document`]s.
//!
//! Supported inputs are JSON rule/glossary lists and plain-text or markdown
//! standards and templates. Binary formats (PDF) are extracted upstream.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ChunkMeta, Document, DocumentFormat, DocumentSection};

/// Loads one file; its source name is the file name.
pub fn load_document(path: &Path) -> Result<Document> { load_as(path, source_name(path)) }

fn load_as(path: &Path, source: String) -> Result<Document> {
    let lower = file_name(path).to_lowercase();
    let ext = path.extension().and_then(|s| s.to_str()).map(str::to_lowercase);
    match ext.as_deref() {
        Some("json") => {
            let raw = read_text(path, &source)?;
            parse_json_as(&source, &lower, &raw)
        }
        Some("txt" | "md") => {
            let text = read_text(path, &source)?;
            let format = if lower.contains("template") || text.contains("TEMPLATE:") {
                DocumentFormat::Template
            } else if lower.contains("iso") || lower.contains("29148") {
                DocumentFormat::Standard
            } else {
                DocumentFormat::Custom
            };
            Ok(Document::from_text(source, format, text))
        }
        _ => Err(Error::ingestion(source, "unsupported format")),
    }
}

/// Loads every regular file under `dir` in path order, following symlinks.
///
/// Sources are paths relative to `dir` with `/` separators (`iso/notes.txt`), so files
/// sharing a name in different subdirectories stay distinct. A file that cannot be
/// read or walked is reported as an `Error::Ingestion` for that entry only.
pub fn load_directory(dir: &Path) -> Result<Vec<Result<Document>>> {
    if !dir.is_dir() {
        return Err(Error::ingestion(dir.display().to_string(), "knowledge directory not found"));
    }
    let mut files: Vec<PathBuf> = Vec::new();
    let mut failures: Vec<Error> = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(true) {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                let source = e.path().map_or_else(|| dir.display().to_string(), |p| relative_source(dir, p));
                failures.push(Error::ingestion(source, e));
            }
        }
    }
    files.sort();
    debug!(dir = %dir.display(), files = files.len(), unreadable = failures.len(), "loading knowledge files");
    let mut docs: Vec<Result<Document>> = files.iter().map(|p| load_as(p, relative_source(dir, p))).collect();
    docs.extend(failures.into_iter().map(Err));
    Ok(docs)
}

/// Builds a document from structured items (`[...]` or `{"items": [...]}`).
pub fn parse_json(source: &str, raw: &str) -> Result<Document> { parse_json_as(source, &source.to_lowercase(), raw) }

/// `name_hint` (lowercased file name) selects the rule or glossary format.
fn parse_json_as(source: &str, name_hint: &str, raw: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(raw).map_err(|e| Error::ingestion(source, format!("invalid JSON: {e}")))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::ingestion(source, "expected a list or an object with an 'items' list")),
        },
        _ => return Err(Error::ingestion(source, "expected a list or an object with an 'items' list")),
    };
    let format = if name_hint.contains("rule") {
        DocumentFormat::Rule
    } else if name_hint.contains("glossary") {
        DocumentFormat::Glossary
    } else {
        DocumentFormat::Custom
    };
    let sections = items.iter().map(render_item).collect();
    Ok(Document { source: source.to_string(), format, sections })
}

fn render_item(item: &Value) -> DocumentSection {
    let Value::Object(map) = item else {
        let text = match item { Value::String(s) => s.clone(), other => other.to_string() };
        return DocumentSection { text, meta: ChunkMeta::default() };
    };
    let field = |key: &str| map.get(key).map(value_text).unwrap_or_default();
    let list = |key: &str| match map.get(key) {
        Some(Value::Array(values)) => values.iter().map(value_text).collect::<Vec<_>>().join(", "),
        Some(other) => value_text(other),
        None => String::new(),
    };

    if map.contains_key("rule_id") {
        let rule_id = field("rule_id");
        let text = [
            format!("Rule {}: {}", rule_id, field("category")),
            format!("Description: {}", field("description")),
            format!("Bad Examples: {}", list("bad_examples")),
            format!("Good Examples: {}", list("good_examples")),
            format!("Correction Strategy: {}", field("correction_strategy")),
        ]
        .join("\n");
        return DocumentSection { text, meta: ChunkMeta { rule_name: Some(rule_id), ..ChunkMeta::default() } };
    }
    if map.contains_key("term") && map.contains_key("definition") {
        let term = field("term");
        let text = format!("{}: {}", term, field("definition"));
        return DocumentSection { text, meta: ChunkMeta { section: Some(term), ..ChunkMeta::default() } };
    }
    DocumentSection { text: item.to_string(), meta: ChunkMeta::default() }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_text(path: &Path, source: &str) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => {
            let bytes = fs::read(path).map_err(|e| Error::ingestion(source, e))?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }
}

fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string())
}

fn file_name(path: &Path) -> String { path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default() }

fn relative_source(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path);
    let parts: Vec<String> = relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
    if parts.is_empty() { source_name(path) } else { parts.join("/") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_items_render_all_fields() {
        let raw = r#"[{"rule_id": "R1", "category": "Vague quantifier", "description": "Avoid 'fast'.",
            "bad_examples": ["The system shall be fast."], "good_examples": ["Respond within 200 ms."],
            "correction_strategy": "Use measurable thresholds."}]"#;
        let doc = parse_json("ambiguity_rules.json", raw).expect("doc");
        assert_eq!(doc.format, DocumentFormat::Rule);
        let section = &doc.sections[0];
        assert!(section.text.starts_with("Rule R1: Vague quantifier"));
        assert!(section.text.contains("Good Examples: Respond within 200 ms."));
        assert_eq!(section.meta.rule_name.as_deref(), Some("R1"));
    }

    #[test]
    fn glossary_items_use_items_wrapper() {
        let raw = r#"{"items": [{"term": "Latency", "definition": "Time between request and response."}]}"#;
        let doc = parse_json("glossary.json", raw).expect("doc");
        assert_eq!(doc.format, DocumentFormat::Glossary);
        assert_eq!(doc.sections[0].text, "Latency: Time between request and response.");
        assert_eq!(doc.sections[0].meta.section.as_deref(), Some("Latency"));
    }

    #[test]
    fn malformed_json_is_an_ingestion_error() {
        let err = parse_json("broken.json", "{not json").unwrap_err();
        assert!(matches!(err, Error::Ingestion { ref source_name, .. } if source_name == "broken.json"));
    }
}
