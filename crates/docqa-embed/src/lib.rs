//! docqa-embed
//!
//! Embedding models (BGE-M3 via candle, or a deterministic hashing embedder)
//! and the async `EmbeddingService` wrapper used by indexing and retrieval.

pub mod bge;
pub mod hash;
pub mod service;

use std::sync::Arc;

use anyhow::Result;
use docqa_core::config::{expand_path, EmbeddingBackend, EmbeddingConfig};
use docqa_core::traits::Embedder;
use tracing::info;

pub use bge::{masked_mean_l2, BgeEmbedder};
pub use hash::HashEmbedder;
pub use service::EmbeddingService;

/// Build the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the
/// hashing embedder regardless of configuration.
pub fn get_default_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake || cfg.backend == EmbeddingBackend::Hash {
        info!(dim = cfg.dim, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(cfg.dim)));
    }
    let dir = bge::resolve_model_dir(&expand_path(&cfg.model_dir))?;
    let model = BgeEmbedder::load(&dir, cfg.max_len)?;
    anyhow::ensure!(
        model.dim() == cfg.dim,
        "model dimension {} does not match embedding.dim {}",
        model.dim(),
        cfg.dim
    );
    Ok(Arc::new(model))
}
