//! assessrec-embed
//!
//! Vectorization functions behind `assessrec_core::traits::Embedder`: the
//! MiniLM sentence model on candle, and a model-free hashed embedder used in
//! tests and offline development.

pub mod device;
pub mod hashed;
pub mod minilm;
pub mod pool;
pub mod tokenize;

use std::path::PathBuf;
use std::sync::Arc;

use assessrec_core::config::{EmbeddingBackend, EmbeddingSettings};
use assessrec_core::traits::Embedder;
use assessrec_core::{Error, Result};
use tracing::info;

pub use hashed::HashedEmbedder;
pub use minilm::MiniLmEmbedder;
pub use pool::masked_mean_l2;

/// Build the embedder the settings ask for.
///
/// `model_dir` is the already-resolved `embedding.model_dir`, if any.
pub fn embedder_from_settings(settings: &EmbeddingSettings, model_dir: Option<PathBuf>) -> Result<Arc<dyn Embedder>> {
    match settings.backend {
        EmbeddingBackend::Hashed => {
            info!(dim = settings.hashed_dim, "using hashed embedder");
            Ok(Arc::new(HashedEmbedder::new(settings.hashed_dim)))
        }
        EmbeddingBackend::Minilm => {
            let dir = minilm::resolve_model_dir(model_dir).map_err(|e| Error::embedding(format!("{:#}", e)))?;
            let model = MiniLmEmbedder::load(&dir, settings.max_len, settings.batch_size)
                .map_err(|e| Error::embedding(format!("{:#}", e)))?;
            Ok(Arc::new(model))
        }
    }
}

/// Default embedder: the hashed embedder when `APP_USE_FAKE_EMBEDDINGS=1`,
/// otherwise MiniLM with default settings.
pub fn get_default_embedder() -> Result<Arc<dyn Embedder>> {
    let mut settings = EmbeddingSettings::default();
    if assessrec_core::config::fake_embeddings_forced() {
        settings.backend = EmbeddingBackend::Hashed;
    }
    embedder_from_settings(&settings, None)
}
