use std::hash::{Hash, Hasher};

use assessrec_core::traits::Embedder;
use assessrec_core::Result;
use twox_hash::XxHash64;

/// Feature-hashed bag of words.
///
/// Each lowercased token is hashed to one of `dim` buckets with a hash-derived
/// sign, and the sum is L2-normalized. Deterministic across runs and
/// platforms, needs no model files, and gives texts that share words a
/// positive cosine similarity. Blank text embeds to the zero vector.
pub struct HashedEmbedder {
    dim: usize,
    id: String,
}

impl HashedEmbedder {
    /// `dim` is clamped to at least 1.
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hashed:xxh64:d{}", dim) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#')))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashedEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_case_do_not_change_tokens() {
        let e = HashedEmbedder::new(64);
        assert_eq!(e.embed_text("Java, SQL!"), e.embed_text("java sql"));
    }

    #[test]
    fn zero_dim_is_clamped() {
        let e = HashedEmbedder::new(0);
        assert_eq!(e.dim(), 1);
        assert_eq!(e.embedder_id(), "hashed:xxh64:d1");
        assert_eq!(e.embed_text("java developer").len(), 1);
    }

    #[test]
    fn blank_text_is_zero_vector() {
        let e = HashedEmbedder::new(16);
        assert!(e.embed_text("  ").iter().all(|x| *x == 0.0));
    }
}
