use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::traits::{Bm25Params, ChunkStore};
use docqa_core::types::{Chunk, DocumentSummary, StoredChunk};
use docqa_core::{Error, Result};
use tracing::warn;

/// Bounds every call on the wrapped store by `limit`. A call that runs out
/// fails with [`Error::StoreUnavailable`].
pub struct TimeoutStore {
    inner: Arc<dyn ChunkStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn ChunkStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.limit.as_millis() as u64, "store call timed out");
                Err(Error::StoreUnavailable(format!("{op} timed out after {:?}", self.limit)))
            }
        }
    }
}

#[async_trait]
impl ChunkStore for TimeoutStore {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn upsert(&self, record: StoredChunk) -> Result<()> {
        self.bounded("upsert", self.inner.upsert(record)).await
    }

    async fn get(&self, id: &str) -> Result<Option<StoredChunk>> {
        self.bounded("get", self.inner.get(id)).await
    }

    async fn top_n_bm25(
        &self,
        terms: &[String],
        n: usize,
        params: Bm25Params,
    ) -> Result<Vec<(Chunk, f32)>> {
        self.bounded("bm25 search", self.inner.top_n_bm25(terms, n, params)).await
    }

    async fn top_n_vector(&self, query: &[f32], n: usize) -> Result<Vec<(Chunk, f32)>> {
        self.bounded("vector search", self.inner.top_n_vector(query, n)).await
    }

    async fn count(&self) -> Result<usize> {
        self.bounded("count", self.inner.count()).await
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>> {
        self.bounded("documents", self.inner.documents()).await
    }

    async fn remove_document(&self, doc_id: &str) -> Result<usize> {
        self.bounded("remove_document", self.inner.remove_document(doc_id)).await
    }

    async fn clear(&self) -> Result<()> {
        self.bounded("clear", self.inner.clear()).await
    }
}
