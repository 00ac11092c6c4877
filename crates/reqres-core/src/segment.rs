use crate::config::ChunkingConfig;
use crate::types::{Chunk, ChunkId, Document, DocumentSection};

const TEMPLATE_MARKER: &str = "TEMPLATE:";

/// Cuts documents into chunks.
///
/// Sections are segmented independently. Inside a section, text with `TEMPLATE:`
/// markers yields one unit per template; other text is split into paragraphs that are
/// packed greedily up to `max_chars`. Units longer than `max_chars` become word-aligned
/// windows that repeat up to `overlap_chars` of trailing context.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: ChunkingConfig,
}

impl Segmenter {
    pub fn new(config: ChunkingConfig) -> Self { Self { config } }

    pub fn segment(&self, doc: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for section in &doc.sections {
            for text in self.segment_section(section) {
                let ordinal = chunks.len();
                chunks.push(Chunk {
                    id: chunk_id(&doc.source, ordinal, &text),
                    source: doc.source.clone(),
                    format: doc.format,
                    text,
                    meta: section.meta.clone(),
                    ordinal,
                });
            }
        }
        chunks
    }

    fn segment_section(&self, section: &DocumentSection) -> Vec<String> {
        let text = section.text.replace("\r\n", "\n");
        let segments = if text.contains(TEMPLATE_MARKER) {
            split_templates(&text).into_iter().flat_map(|unit| self.fit(unit)).collect()
        } else {
            self.pack(&split_paragraphs(&text))
        };
        segments
            .into_iter()
            .filter(|s| s.chars().count() >= self.config.min_chars.max(1))
            .collect()
    }

    fn pack(&self, paragraphs: &[String]) -> Vec<String> {
        let max = self.config.max_chars;
        let mut out = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;
        for paragraph in paragraphs {
            let len = paragraph.chars().count();
            if len > max {
                if !current.is_empty() { out.push(std::mem::take(&mut current)); current_len = 0; }
                out.extend(self.split_with_overlap(paragraph));
                continue;
            }
            if !current.is_empty() && current_len + 2 + len > max {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() { current.push_str("\n\n"); current_len += 2; }
            current.push_str(paragraph);
            current_len += len;
        }
        if !current.is_empty() { out.push(current); }
        out
    }

    fn fit(&self, unit: String) -> Vec<String> {
        if unit.chars().count() > self.config.max_chars { self.split_with_overlap(&unit) } else { vec![unit] }
    }

    fn split_with_overlap(&self, text: &str) -> Vec<String> {
        let (max, overlap) = (self.config.max_chars.max(1), self.config.overlap_chars);
        let words: Vec<&str> = text.split_whitespace().flat_map(|w| hard_split(w, max)).collect();
        let mut windows = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let mut end = start;
            let mut len = 0usize;
            while end < words.len() {
                let add = words[end].chars().count() + usize::from(end > start);
                if end > start && len + add > max { break; }
                len += add;
                end += 1;
            }
            windows.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            // Step back over trailing words that fit in the overlap, always advancing by one word.
            let mut next = end;
            let mut carried = 0usize;
            while next > start + 1 {
                let w = words[next - 1].chars().count() + 1;
                if carried + w > overlap { break; }
                carried += w;
                next -= 1;
            }
            start = next;
        }
        windows
    }
}

/// Cuts a word longer than `max` characters (URLs, hashes) into `max`-character pieces.
fn hard_split(word: &str, max: usize) -> Vec<&str> {
    if word.chars().count() <= max { return vec![word]; }
    let bounds: Vec<usize> = word.char_indices().map(|(i, _)| i).step_by(max).chain(std::iter::once(word.len())).collect();
    bounds.windows(2).map(|w| &word[w[0]..w[1]]).collect()
}

pub fn chunk_id(source: &str, ordinal: usize, text: &str) -> ChunkId {
    let hash = blake3::hash(text.as_bytes()).to_hex();
    format!("{}:{}:{}", source, ordinal, &hash.as_str()[..12])
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() { paragraphs.push(current.join("\n").trim().to_string()); current.clear(); }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() { paragraphs.push(current.join("\n").trim().to_string()); }
    paragraphs
}

fn split_templates(text: &str) -> Vec<String> {
    let mut starts: Vec<usize> = text.match_indices(TEMPLATE_MARKER).map(|(i, _)| i).collect();
    if starts.first() != Some(&0) { starts.insert(0, 0); }
    starts.push(text.len());
    starts
        .windows(2)
        .map(|w| text[w[0]..w[1]].trim().to_string())
        .filter(|unit| !unit.is_empty())
        .collect()
}
