use std::sync::Arc;
use std::time::Duration;

use docqa_core::config::EmbeddingConfig;
use docqa_core::traits::Embedder;
use docqa_core::{Error, Result};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Async front for a blocking [`Embedder`].
///
/// Every call runs on the blocking pool and holds one of `max_concurrency`
/// permits for as long as the model is busy. The timeout covers both the wait
/// for a permit and the model call. Timeouts, model errors and vectors of the
/// wrong dimension fail with [`Error::EmbeddingService`].
#[derive(Clone)]
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>, cfg: &EmbeddingConfig) -> Self {
        Self::with_limits(embedder, cfg.max_concurrency, cfg.timeout())
    }

    pub fn with_limits(
        embedder: Arc<dyn Embedder>,
        max_concurrency: usize,
        timeout: Duration,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
        Self { embedder, permits, timeout }
    }

    pub fn dim(&self) -> usize {
        self.embedder.dim()
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(vec![text.to_string()]).await?;
        out.pop().ok_or_else(|| Error::embedding("model returned no vector"))
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let permits = self.permits.clone();
        let embedder = self.embedder.clone();
        // the deadline covers waiting for a permit too: a hung model keeps
        // its permit after its caller gives up
        let work = async move {
            let permit = permits.acquire_owned().await.map_err(Error::embedding)?;
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                embedder.embed_batch(&texts)
            });
            match task.await {
                Err(join) => Err(Error::embedding(join)),
                Ok(Err(e)) => Err(Error::embedding(format!("{e:#}"))),
                Ok(Ok(vectors)) => Ok(vectors),
            }
        };
        let Ok(result) = tokio::time::timeout(self.timeout, work).await else {
            warn!(timeout_ms = self.timeout.as_millis() as u64, "embedding timed out");
            return Err(Error::EmbeddingService(format!("timed out after {:?}", self.timeout)));
        };
        let vectors = result?;
        self.check(&vectors, expected)?;
        debug!(count = expected, model = self.model_id(), "embedded");
        Ok(vectors)
    }

    fn check(&self, vectors: &[Vec<f32>], expected: usize) -> Result<()> {
        if vectors.len() != expected {
            let got = vectors.len();
            return Err(Error::EmbeddingService(format!("expected {expected} vectors, got {got}")));
        }
        let dim = self.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            let got = bad.len();
            return Err(Error::EmbeddingService(format!("expected dimension {dim}, got {got}")));
        }
        if vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err(Error::embedding("non-finite value in embedding"));
        }
        Ok(())
    }
}
