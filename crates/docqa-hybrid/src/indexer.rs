use std::sync::Arc;
use std::time::{Duration, Instant};

use docqa_core::traits::ChunkStore;
use docqa_core::types::{Chunk, Document, DocumentId, StoredChunk};
use docqa_core::Result;
use docqa_embed::EmbeddingService;
use docqa_text::lexical_stats;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub doc_id: DocumentId,
    pub source: String,
    pub chunks: usize,
    pub elapsed: Duration,
}

/// Embeds chunks, computes their term statistics and upserts them.
pub struct Indexer {
    store: Arc<dyn ChunkStore>,
    embeddings: EmbeddingService,
    concurrency: usize,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embeddings: EmbeddingService,
        concurrency: usize,
    ) -> Self {
        Self { store, embeddings, concurrency: concurrency.max(1) }
    }

    /// Index one chunk. Nothing is written if embedding fails.
    pub async fn index_chunk(&self, chunk: &Chunk) -> Result<()> {
        let embedding = self.embeddings.embed(&chunk.text).await?;
        let lexical = lexical_stats(&chunk.text);
        self.store.upsert(StoredChunk { chunk: chunk.clone(), embedding, lexical }).await?;
        debug!(chunk = %chunk.id, "indexed");
        Ok(())
    }

    /// Index every chunk of `doc` through a bounded pool. On the first
    /// failure the remaining work is dropped and the document's chunks are
    /// removed again.
    pub async fn index_document(&self, doc: &Document, chunks: &[Chunk]) -> Result<IndexReport> {
        let start = Instant::now();
        let mut pending = stream::iter(chunks.iter().map(|c| self.index_chunk(c)))
            .buffer_unordered(self.concurrency);
        let mut failure = None;
        while let Some(res) = pending.next().await {
            if let Err(e) = res {
                failure = Some(e);
                break;
            }
        }
        drop(pending);

        if let Some(err) = failure {
            warn!(
                doc = %doc.id,
                source = %doc.source,
                error = %err,
                "indexing failed, rolling back"
            );
            self.rollback(&doc.id).await;
            return Err(err);
        }
        let report = IndexReport {
            doc_id: doc.id.clone(),
            source: doc.source.clone(),
            chunks: chunks.len(),
            elapsed: start.elapsed(),
        };
        info!(
            doc = %report.doc_id,
            source = %report.source,
            chunks = report.chunks,
            ms = report.elapsed.as_millis() as u64,
            "indexed document"
        );
        Ok(report)
    }

    async fn rollback(&self, doc_id: &str) {
        match self.store.remove_document(doc_id).await {
            Ok(removed) => warn!(doc = doc_id, removed, "removed partially indexed chunks"),
            Err(e) => warn!(doc = doc_id, error = %e, "rollback failed; partial chunks may remain"),
        }
    }
}
