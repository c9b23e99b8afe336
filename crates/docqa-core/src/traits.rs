use async_trait::async_trait;

use crate::conversation::Turn;
use crate::error::Result;
use crate::types::{
    Chunk, ContextChunk, DocumentSummary, FusedResult, RetrievalMethod, RetrievalResult,
    StoredChunk,
};

/// Text embedding model. Implementations must return vectors of `dim()`
/// for every input and must be used identically at index and query time.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model/configuration (e.g. `hash:d1024`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// BM25 parameters. See `docqa_text::bm25` for the scoring function.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Persistence for chunk text, metadata, embedding and lexical statistics.
///
/// `upsert` is all-or-nothing per chunk: a record is either fully visible to
/// readers or not at all. Top-n queries return `(chunk, score)` ordered by
/// descending score with ties broken by ascending chunk id.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Embedding dimension every stored vector has.
    fn dim(&self) -> usize;
    async fn upsert(&self, record: StoredChunk) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<StoredChunk>>;
    async fn top_n_bm25(
        &self,
        terms: &[String],
        n: usize,
        params: Bm25Params,
    ) -> Result<Vec<(Chunk, f32)>>;
    async fn top_n_vector(&self, query: &[f32], n: usize) -> Result<Vec<(Chunk, f32)>>;
    async fn count(&self) -> Result<usize>;
    async fn documents(&self) -> Result<Vec<DocumentSummary>>;
    /// Remove every chunk of a document. Returns the number removed.
    async fn remove_document(&self, doc_id: &str) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
}

/// A ranked-candidates strategy over the knowledge base.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn method(&self) -> RetrievalMethod;
    async fn retrieve(&self, query: &str, n: usize) -> Result<Vec<RetrievalResult>>;
}

/// Combines the lexical and vector lists into at most `k` ranked results.
pub trait FusionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn fuse(
        &self,
        lexical: &[RetrievalResult],
        vector: &[RetrievalResult],
        k: usize,
    ) -> Vec<FusedResult>;
}

/// Language-model service.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;
    async fn generate(
        &self,
        context: &[ContextChunk],
        history: &[Turn],
        query: &str,
    ) -> anyhow::Result<String>;
}
