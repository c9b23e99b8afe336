use std::sync::Arc;

use docqa_core::traits::{FusionStrategy, Retriever};
use docqa_core::types::FusedResult;
use docqa_core::Result;
use tracing::{debug, info, warn};

/// Query path: both retrievers concurrently, then fusion.
pub struct QueryPipeline {
    lexical: Arc<dyn Retriever>,
    vector: Arc<dyn Retriever>,
    fusion: Box<dyn FusionStrategy>,
    top_n: usize,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(
        lexical: Arc<dyn Retriever>,
        vector: Arc<dyn Retriever>,
        fusion: Box<dyn FusionStrategy>,
        top_n: usize,
        top_k: usize,
    ) -> Self {
        Self { lexical, vector, fusion, top_n, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn search(&self, query: &str) -> Result<Vec<FusedResult>> {
        self.search_k(query, self.top_k).await
    }

    /// Retrieve `top_n` candidates from each retriever and fuse them into at
    /// most `k` results. Either retriever failing fails the query.
    pub async fn search_k(&self, query: &str, k: usize) -> Result<Vec<FusedResult>> {
        let n = self.top_n.max(k);
        let (lexical, vector) =
            tokio::try_join!(self.lexical.retrieve(query, n), self.vector.retrieve(query, n))?;
        debug!(lexical = lexical.len(), vector = vector.len(), "candidates");
        if lexical.is_empty() && !vector.is_empty() {
            warn!("no lexical matches, ranking by vector similarity only");
        }
        let fused = self.fusion.fuse(&lexical, &vector, k);
        info!(fusion = self.fusion.name(), results = fused.len(), "query fused");
        Ok(fused)
    }
}
