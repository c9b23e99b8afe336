use std::sync::Arc;

use async_trait::async_trait;
use docqa_core::traits::{Bm25Params, ChunkStore, Retriever};
use docqa_core::types::{RetrievalMethod, RetrievalResult};
use docqa_core::Result;
use tracing::debug;

use crate::analyzer::query_terms;

/// BM25 retriever over whatever `ChunkStore` holds the lexical statistics.
pub struct LexicalRetriever {
    store: Arc<dyn ChunkStore>,
    params: Bm25Params,
}

impl LexicalRetriever {
    pub fn new(store: Arc<dyn ChunkStore>, params: Bm25Params) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::Lexical
    }

    async fn retrieve(&self, query: &str, n: usize) -> Result<Vec<RetrievalResult>> {
        let terms = query_terms(query);
        if terms.is_empty() || n == 0 {
            // query was nothing but stop words or punctuation
            debug!(query, "no lexical terms");
            return Ok(Vec::new());
        }
        let hits = self.store.top_n_bm25(&terms, n, self.params).await?;
        debug!(terms = ?terms, hits = hits.len(), "bm25");
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| RetrievalResult {
                chunk,
                score,
                method: RetrievalMethod::Lexical,
            })
            .collect())
    }
}
