//! Sentence splitting and a lexicon-based ambiguity classifier.

use crate::error::Result;
use crate::traits::AmbiguityClassifier;
use crate::types::{Classification, Label};

/// Splits requirement text on line breaks and sentence-ending punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            let at_boundary = matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace());
            if at_boundary {
                push_trimmed(&mut sentences, &current);
                current.clear();
            }
        }
        push_trimmed(&mut sentences, &current);
    }
    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim().trim_start_matches(['-', '*', '•']).trim();
    if !s.is_empty() { out.push(s.to_string()); }
}

const VAGUE_TERMS: &[&str] = &[
    "fast", "quick", "quickly", "slow", "efficient", "efficiently", "user-friendly", "easy", "easily",
    "simple", "intuitive", "flexible", "robust", "reliable", "adequate", "appropriate", "sufficient",
    "seamless", "optimal", "minimal", "maximize", "minimize", "several", "many", "few", "some",
    "approximately", "normally", "typically", "usually", "etc", "and/or", "large", "small", "modern",
    "secure", "scalable", "as soon as possible", "if possible", "as appropriate", "where feasible",
];

/// Flags sentences containing vague or unmeasurable terms.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn hits(sentence: &str) -> usize {
        let lower = sentence.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '/'))
            .filter(|w| !w.is_empty())
            .collect();
        VAGUE_TERMS
            .iter()
            .filter(|&&term| if term.contains(' ') { lower.contains(term) } else { words.contains(&term) })
            .count()
    }
}

impl AmbiguityClassifier for KeywordClassifier {
    fn classify(&self, sentence: &str) -> Result<Classification> {
        let hits = Self::hits(sentence);
        if hits == 0 {
            return Ok(Classification { label: Label::Clear, confidence: 0.6 });
        }
        let confidence = (0.55 + 0.15 * hits as f32).min(0.99);
        Ok(Classification { label: Label::Ambiguous, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_punctuation_and_lines() {
        let text = "The system should be fast. It must log errors!\n- Users can export reports\n\nv1.2 is supported.";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "The system should be fast.".to_string(),
                "It must log errors!".to_string(),
                "Users can export reports".to_string(),
                "v1.2 is supported.".to_string(),
            ]
        );
    }

    #[test]
    fn vague_terms_are_ambiguous() {
        let c = KeywordClassifier.classify("The system should be fast.").expect("classify");
        assert_eq!(c.label, Label::Ambiguous);
        assert!(c.confidence > 0.5 && c.confidence <= 1.0);
    }

    #[test]
    fn measurable_sentence_is_clear() {
        let c = KeywordClassifier.classify("The API shall respond within 200 ms for 95% of requests.").expect("classify");
        assert_eq!(c.label, Label::Clear);
    }

    #[test]
    fn multi_word_terms_match() {
        assert_eq!(KeywordClassifier::hits("Deliver the report as soon as possible."), 1);
    }
}
