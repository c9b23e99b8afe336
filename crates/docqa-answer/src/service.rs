use std::sync::Arc;

use docqa_core::config::{EmptyPolicy, Settings};
use docqa_core::conversation::Query;
use docqa_core::traits::Generator;
use docqa_core::types::Answer;
use docqa_core::{Error, Result};
use docqa_hybrid::KnowledgeBase;
use tracing::{info, warn};

use crate::assembler::AnswerAssembler;

/// Question answering over a [`KnowledgeBase`].
pub struct QaService {
    kb: Arc<KnowledgeBase>,
    assembler: AnswerAssembler,
    on_empty: EmptyPolicy,
}

impl QaService {
    pub fn new(kb: Arc<KnowledgeBase>, generator: Arc<dyn Generator>, settings: &Settings) -> Self {
        Self {
            kb,
            assembler: AnswerAssembler::new(generator, &settings.generation),
            on_empty: settings.retrieval.on_empty,
        }
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    /// Retrieve, fuse and answer. Retrieval errors abort before the
    /// generator is called.
    pub async fn ask(&self, query: &Query) -> Result<Answer> {
        query.validate()?;
        let results = self.kb.search(&query.text).await?;
        if results.is_empty() {
            match self.on_empty {
                EmptyPolicy::Error => return Err(Error::NoResults),
                EmptyPolicy::Generate => warn!("no chunks retrieved, generating without context"),
            }
        }
        info!(results = results.len(), history = query.history.len(), "answering");
        self.assembler.assemble(&results, &query.text, &query.history).await
    }
}
