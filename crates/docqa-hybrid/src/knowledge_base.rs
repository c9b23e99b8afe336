//! `KnowledgeBase`: chunking, indexing, supersession and search behind one handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use docqa_core::chunker::Chunker;
use docqa_core::config::Settings;
use docqa_core::loader::{collect_text_files, load_pages};
use docqa_core::traits::{ChunkStore, Embedder};
use docqa_core::types::{Document, DocumentSummary, FusedResult, Page};
use docqa_core::Result;
use docqa_embed::{get_default_embedder, EmbeddingService};
use docqa_text::LexicalRetriever;
use docqa_vector::{open_store, TimeoutStore, VectorRetriever};
use serde::Serialize;
use tracing::{info, warn};

use crate::fusion::build_fusion;
use crate::indexer::{IndexReport, Indexer};
use crate::pipeline::QueryPipeline;

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseStatus {
    pub chunks: usize,
    pub documents: Vec<DocumentSummary>,
    pub embedding_model: String,
    pub dim: usize,
}

/// Result of ingesting one file during a directory ingest.
#[derive(Debug)]
pub struct IngestOutcome {
    pub path: PathBuf,
    pub result: Result<IndexReport>,
}

pub struct KnowledgeBase {
    store: Arc<dyn ChunkStore>,
    embeddings: EmbeddingService,
    chunker: Chunker,
    indexer: Indexer,
    pipeline: QueryPipeline,
}

impl KnowledgeBase {
    /// Build the embedder and store named in `settings`.
    pub async fn open(settings: &Settings) -> anyhow::Result<Self> {
        let embedder = get_default_embedder(&settings.embedding)?;
        let store = open_store(&settings.store, embedder.dim()).await?;
        Ok(Self::from_parts(settings, store, embedder)?)
    }

    /// Every store call made through the knowledge base is bounded by
    /// `store.timeout_ms`.
    pub fn from_parts(
        settings: &Settings,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        settings.validate()?;
        let store: Arc<dyn ChunkStore> =
            Arc::new(TimeoutStore::new(store, settings.store.timeout()));
        let embeddings = EmbeddingService::new(embedder, &settings.embedding);
        let chunker = Chunker::new(settings.chunking.clone())?;
        let concurrency = settings.embedding.max_concurrency;
        let indexer = Indexer::new(store.clone(), embeddings.clone(), concurrency);
        let lexical = Arc::new(LexicalRetriever::new(store.clone(), settings.bm25));
        let vector = Arc::new(VectorRetriever::new(store.clone(), embeddings.clone()));
        let pipeline = QueryPipeline::new(
            lexical,
            vector,
            build_fusion(&settings.retrieval)?,
            settings.retrieval.top_n,
            settings.retrieval.top_k,
        );
        Ok(Self { store, embeddings, chunker, indexer, pipeline })
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &QueryPipeline {
        &self.pipeline
    }

    /// Chunk and index one document's pages. On success any earlier document
    /// with the same source is removed. An empty document fails before
    /// anything is written.
    pub async fn ingest_pages(&self, source: &str, pages: &[Page]) -> Result<IndexReport> {
        let doc = Document::new(source);
        let chunks = self.chunker.chunk(&doc, pages)?;
        let previous: Vec<DocumentSummary> = self
            .store
            .documents()
            .await?
            .into_iter()
            .filter(|d| d.source == source && d.doc_id != doc.id)
            .collect();

        let report = self.indexer.index_document(&doc, &chunks).await?;

        for old in previous {
            let old_id = old.doc_id.as_str();
            match self.store.remove_document(old_id).await {
                Ok(removed) => {
                    info!(source, old = old_id, new = %doc.id, removed, "superseded older version")
                }
                Err(e) => {
                    warn!(source, old = old_id, error = %e, "failed to remove superseded document")
                }
            }
        }
        Ok(report)
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IndexReport> {
        let pages = load_pages(path)?;
        self.ingest_pages(&path.display().to_string(), &pages).await
    }

    /// Ingest every `.txt` file under `paths`, one outcome per file.
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> Vec<IngestOutcome> {
        self.ingest_paths_with(paths, |_, _| {}).await
    }

    /// Like [`Self::ingest_paths`], calling `on_file(total, outcome)` as each
    /// file finishes. `total` is the number of files found.
    pub async fn ingest_paths_with<F>(
        &self,
        paths: &[PathBuf],
        mut on_file: F,
    ) -> Vec<IngestOutcome>
    where
        F: FnMut(usize, &IngestOutcome),
    {
        let files = collect_text_files(paths);
        let total = files.len();
        let mut outcomes = Vec::with_capacity(total);
        for path in files {
            let result = self.ingest_file(&path).await;
            if let Err(e) = &result {
                warn!(path = %path.display(), error = %e, "ingest failed");
            }
            let outcome = IngestOutcome { path, result };
            on_file(total, &outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    pub async fn search(&self, query: &str) -> Result<Vec<FusedResult>> {
        self.pipeline.search(query).await
    }

    pub async fn status(&self) -> Result<KnowledgeBaseStatus> {
        Ok(KnowledgeBaseStatus {
            chunks: self.store.count().await?,
            documents: self.store.documents().await?,
            embedding_model: self.embeddings.model_id().to_string(),
            dim: self.embeddings.dim(),
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        info!("knowledge base cleared");
        Ok(())
    }
}
