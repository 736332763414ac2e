use std::sync::Arc;

use crate::error::Result;
use crate::types::Candidate;

/// A vectorization function. Every vector it returns has length `dim()`.
///
/// `embedder_id` must change whenever the produced vectors would, so a
/// persisted store can refuse to be queried through a different function.
pub trait Embedder: Send + Sync {
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| crate::error::Error::embedding("embedder returned no vector"))
    }
}

/// Anything that can answer "k most similar catalog items to this query".
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Candidate>>;
}

impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    fn embedder_id(&self) -> &str { (**self).embedder_id() }
    fn dim(&self) -> usize { (**self).dim() }
    fn max_len(&self) -> usize { (**self).max_len() }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { (**self).embed_batch(texts) }
}

impl<T: Retriever + ?Sized> Retriever for Arc<T> {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Candidate>> { (**self).retrieve(query, k) }
}
