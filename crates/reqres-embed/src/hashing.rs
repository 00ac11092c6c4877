use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use reqres_core::error::{Error, Result};
use reqres_core::traits::Embedder;

/// Feature-hashing embedder: each lowercased word bumps one bucket of an
/// L2-normalised vector. No model files needed; texts sharing words get
/// positive cosine similarity.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("hash:xxh64:d{dim}") } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);
        for word in words {
            let mut hasher = XxHash64::with_seed(0);
            word.hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            v[idx] += 1.0 + ((h >> 32) as u32 as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.dim == 0 { return Err(Error::Model("hashing embedder needs a positive dimension".into())); }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[test]
    fn shared_words_score_higher() {
        let e = HashingEmbedder::new(256);
        let v = e
            .embed_batch(&["the system should be fast".into(), "fast systems".into(), "passive voice".into()])
            .expect("embed");
        assert!(cosine(&v[0], &v[1]) > cosine(&v[0], &v[2]));
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        let e = HashingEmbedder::new(64);
        let v = e.embed_batch(&["Fast.".into(), "fast".into()]).expect("embed");
        assert_eq!(v[0], v[1]);
    }
}
