use std::sync::Arc;
use std::time::Duration;

use docqa_core::config::GenerationConfig;
use docqa_core::conversation::{trim_history, Turn};
use docqa_core::traits::Generator;
use docqa_core::types::{Answer, FusedResult};
use docqa_core::{Error, Result};
use tracing::{debug, info};

use crate::citations::build_citations;
use crate::context::build_context;

/// Turns fused results plus conversation into a cited answer.
pub struct AnswerAssembler {
    generator: Arc<dyn Generator>,
    timeout: Duration,
    max_context_chars: usize,
    max_history_turns: usize,
}

impl AnswerAssembler {
    pub fn new(generator: Arc<dyn Generator>, cfg: &GenerationConfig) -> Self {
        Self {
            generator,
            timeout: cfg.timeout(),
            max_context_chars: cfg.max_context_chars,
            max_history_turns: cfg.max_history_turns,
        }
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    /// Build the numbered context, call the generator once and attach
    /// citations. Generator failures and timeouts are reported as
    /// [`Error::GenerationService`] with the underlying message.
    pub async fn assemble(
        &self,
        results: &[FusedResult],
        query: &str,
        history: &[Turn],
    ) -> Result<Answer> {
        let context = build_context(results, self.max_context_chars);
        let history = trim_history(history, self.max_history_turns);
        debug!(context = context.len(), history = history.len(), "assembling answer");

        let call = self.generator.generate(&context, history, query);
        let text = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(Error::generation(format!("{e:#}"))),
            Err(_) => {
                let ms = self.timeout.as_millis();
                return Err(Error::generation(format!("timed out after {ms} ms")));
            }
        };

        let citations = build_citations(&text, &context);
        info!(model = self.generator.model_id(), citations = citations.len(), "answer generated");
        Ok(Answer { text, citations })
    }
}
