//! docqa-vector
//!
//! Chunk persistence (in-memory and LanceDB), per-call store timeouts and
//! the cosine vector retriever.

pub mod lance;
pub mod memory;
pub mod retriever;
pub mod schema;
pub mod similarity;
pub mod timeout;

use std::sync::Arc;

use docqa_core::config::{StoreBackend, StoreConfig};
use docqa_core::traits::ChunkStore;
use docqa_core::{Error, Result};
use tracing::info;

pub use lance::LanceStore;
pub use memory::MemoryStore;
pub use retriever::VectorRetriever;
pub use similarity::cosine;
pub use timeout::TimeoutStore;

/// Open the configured store for `dim`-dimensional embeddings.
pub async fn open_store(cfg: &StoreConfig, dim: usize) -> Result<Arc<dyn ChunkStore>> {
    match cfg.backend {
        StoreBackend::Memory => {
            info!(dim, "using in-memory store");
            Ok(Arc::new(MemoryStore::new(dim)))
        }
        StoreBackend::Lance => {
            let path = cfg.resolved_path();
            std::fs::create_dir_all(&path)
                .map_err(|source| Error::Io { path: path.display().to_string(), source })?;
            info!(path = %path.display(), table = %cfg.table, dim, "opening lance store");
            Ok(Arc::new(LanceStore::open(&path, &cfg.table, dim).await?))
        }
    }
}
