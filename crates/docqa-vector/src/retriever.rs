use std::sync::Arc;

use async_trait::async_trait;
use docqa_core::traits::{ChunkStore, Retriever};
use docqa_core::types::{RetrievalMethod, RetrievalResult};
use docqa_core::{Error, Result};
use docqa_embed::EmbeddingService;
use tracing::debug;

/// Embeds the query with the same service used at index time and ranks
/// chunks by cosine similarity.
pub struct VectorRetriever {
    store: Arc<dyn ChunkStore>,
    embeddings: EmbeddingService,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn ChunkStore>, embeddings: EmbeddingService) -> Self {
        Self { store, embeddings }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::Vector
    }

    async fn retrieve(&self, query: &str, n: usize) -> Result<Vec<RetrievalResult>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let q = self.embeddings.embed(query).await?;
        if q.len() != self.store.dim() {
            return Err(Error::EmbeddingService(format!(
                "query embedding has dimension {}, store holds {}",
                q.len(),
                self.store.dim()
            )));
        }
        let hits = self.store.top_n_vector(&q, n).await?;
        debug!(hits = hits.len(), "vector");
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| RetrievalResult { chunk, score, method: RetrievalMethod::Vector })
            .collect())
    }
}
