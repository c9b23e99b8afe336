//! Chat-completions client for OpenAI-compatible endpoints (Moonshot, vLLM,
//! llama.cpp server and friends).

use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use docqa_core::config::GenerationConfig;
use docqa_core::conversation::Turn;
use docqa_core::traits::Generator;
use docqa_core::types::ContextChunk;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::context::render_context;

const CITATION_RULES: &str = "Answer using only the numbered context passages below. \
Cite every passage you rely on with its marker, for example [1] or [2, 3]. \
If the context does not contain the answer, say so.";

const NO_CONTEXT_NOTE: &str = "No context passages were found for this question. \
Say that the knowledge base has no answer.";

pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
}

impl OpenAiGenerator {
    pub fn from_config(cfg: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = cfg.api_key();
        if api_key.is_none() {
            warn!(env = %cfg.api_key_env, "no API key set; requests are sent unauthenticated");
        }
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            system_prompt: cfg.system_prompt.clone(),
        })
    }

    /// System prompt with the rendered context, then prior turns, then the question.
    pub fn build_messages(
        &self,
        context: &[ContextChunk],
        history: &[Turn],
        query: &str,
    ) -> Vec<Value> {
        let system = if context.is_empty() {
            format!("{}\n\n{}", self.system_prompt, NO_CONTEXT_NOTE)
        } else {
            format!("{}\n\n{}\n\n{}", self.system_prompt, CITATION_RULES, render_context(context))
        };
        let mut messages = vec![json!({ "role": "system", "content": system })];
        messages.extend(
            history.iter().map(|t| json!({ "role": t.role(), "content": t.content() })),
        );
        messages.push(json!({ "role": "user", "content": query }));
        messages
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        context: &[ContextChunk],
        history: &[Turn],
        query: &str,
    ) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": self.build_messages(context, history, query),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, "chat completion request");

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.with_context(|| format!("request to {url} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("{status}: {text}");
        }
        let json: Value = resp.json().await.context("decoding completion response")?;
        json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("response has no choices[0].message.content"))
    }
}
