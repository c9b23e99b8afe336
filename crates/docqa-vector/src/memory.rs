use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use docqa_core::traits::{Bm25Params, ChunkStore};
use docqa_core::types::{rank_order, Chunk, ChunkId, DocumentSummary, LexicalStats, StoredChunk};
use docqa_core::{Error, Result};
use tokio::sync::RwLock;

use crate::similarity::cosine;

/// In-process store. Each upsert replaces the record under a single write
/// lock, so readers see either the old record or the new one.
pub struct MemoryStore {
    dim: usize,
    chunks: RwLock<BTreeMap<ChunkId, StoredChunk>>,
}

impl MemoryStore {
    pub fn new(dim: usize) -> Self {
        Self { dim, chunks: RwLock::new(BTreeMap::new()) }
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn upsert(&self, record: StoredChunk) -> Result<()> {
        if record.embedding.len() != self.dim {
            return Err(Error::StoreUnavailable(format!(
                "embedding dimension {} does not match store dimension {}",
                record.embedding.len(),
                self.dim
            )));
        }
        self.chunks.write().await.insert(record.chunk.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredChunk>> {
        Ok(self.chunks.read().await.get(id).cloned())
    }

    async fn top_n_bm25(
        &self,
        terms: &[String],
        n: usize,
        params: Bm25Params,
    ) -> Result<Vec<(Chunk, f32)>> {
        let chunks = self.chunks.read().await;
        let docs: Vec<(&Chunk, &LexicalStats)> =
            chunks.values().map(|r| (&r.chunk, &r.lexical)).collect();
        Ok(docqa_text::bm25::top_n(&docs, terms, n, params))
    }

    async fn top_n_vector(&self, query: &[f32], n: usize) -> Result<Vec<(Chunk, f32)>> {
        let chunks = self.chunks.read().await;
        let mut scored: Vec<(&Chunk, f32)> =
            chunks.values().map(|r| (&r.chunk, cosine(query, &r.embedding))).collect();
        scored.sort_by(|a, b| rank_order(a.1, &a.0.id, b.1, &b.0.id));
        scored.truncate(n);
        Ok(scored.into_iter().map(|(c, s)| (c.clone(), s)).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().await.len())
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>> {
        let chunks = self.chunks.read().await;
        let mut by_doc: HashMap<&str, DocumentSummary> = HashMap::new();
        for r in chunks.values() {
            by_doc
                .entry(r.chunk.doc_id.as_str())
                .or_insert_with(|| DocumentSummary {
                    doc_id: r.chunk.doc_id.clone(),
                    source: r.chunk.source.clone(),
                    chunks: 0,
                })
                .chunks += 1;
        }
        Ok(sorted_summaries(by_doc.into_values().collect()))
    }

    async fn remove_document(&self, doc_id: &str) -> Result<usize> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|_, r| r.chunk.doc_id != doc_id);
        Ok(before - chunks.len())
    }

    async fn clear(&self) -> Result<()> {
        self.chunks.write().await.clear();
        Ok(())
    }
}

pub(crate) fn sorted_summaries(mut docs: Vec<DocumentSummary>) -> Vec<DocumentSummary> {
    docs.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.doc_id.cmp(&b.doc_id)));
    docs
}
