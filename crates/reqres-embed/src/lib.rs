//! reqres-embed
//!
//! Local models: a BERT sentence embedder, a BERT cross-encoder used as the
//! pairwise reranker, and a hashing embedder for offline runs and tests.

pub mod bert;
pub mod cross_encoder;
pub mod device;
pub mod hashing;
pub mod pool;
pub mod tokenize;

use std::path::Path;
use std::sync::Arc;

use reqres_core::config::ModelConfig;
use reqres_core::traits::Embedder;
use reqres_core::Result;
use tracing::info;

pub use bert::BertEmbedder;
pub use cross_encoder::CrossEncoderReranker;
pub use hashing::HashingEmbedder;
pub use pool::masked_mean_l2;

/// Builds the embedder selected by `models`. Ingestion and querying must use the same one.
pub fn load_embedder(models: &ModelConfig) -> Result<Arc<dyn Embedder>> {
    if models.use_hashing_embedder {
        info!(dim = models.hashing_dim, "using hashing embedder");
        return Ok(Arc::new(HashingEmbedder::new(models.hashing_dim)));
    }
    Ok(Arc::new(BertEmbedder::load(Path::new(&models.embedder_dir), models.max_len)?))
}
