//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__ALPHA=0.5`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::chunker::ChunkingConfig;
use crate::error::Error;
use crate::traits::Bm25Params;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the full typed settings. Missing keys take defaults.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to parse settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub bm25: Bm25Params,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub store: StoreConfig,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        Config::load()?.settings()
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.chunking.validate()?;
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            let alpha = self.retrieval.alpha;
            return invalid(format!("retrieval.alpha must be in [0, 1], got {alpha}"));
        }
        if self.retrieval.top_n == 0 || self.retrieval.top_k == 0 {
            return invalid("retrieval.top_n and retrieval.top_k must be positive".to_string());
        }
        if self.retrieval.top_k > self.retrieval.top_n {
            let (top_k, top_n) = (self.retrieval.top_k, self.retrieval.top_n);
            return invalid(format!("retrieval.top_k ({top_k}) exceeds retrieval.top_n ({top_n})"));
        }
        if self.retrieval.rrf_k <= 0.0 {
            return invalid("retrieval.rrf_k must be positive".to_string());
        }
        if self.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            let (k1, b) = (self.bm25.k1, self.bm25.b);
            return invalid(format!("bm25 requires k1 >= 0 and b in [0, 1], got k1={k1} b={b}"));
        }
        let embedding = &self.embedding;
        if embedding.dim == 0 || embedding.max_concurrency == 0 || embedding.timeout_ms == 0 {
            return invalid(
                "embedding.dim, embedding.max_concurrency and embedding.timeout_ms must be positive"
                    .to_string(),
            );
        }
        if self.generation.timeout_ms == 0 || self.generation.max_context_chars == 0 {
            return invalid(
                "generation.timeout_ms and generation.max_context_chars must be positive"
                    .to_string(),
            );
        }
        if self.store.timeout_ms == 0 {
            return invalid("store.timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionKind {
    Weighted,
    Rrf,
}

/// What to do when retrieval finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPolicy {
    /// Fail with `Error::NoResults`.
    Error,
    /// Call the generator with an empty context.
    Generate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_n: usize,
    pub top_k: usize,
    /// Vector weight in weighted fusion.
    pub alpha: f32,
    pub fusion: FusionKind,
    pub rrf_k: f32,
    pub on_empty: EmptyPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: 8,
            top_k: 4,
            alpha: 0.75,
            fusion: FusionKind::Weighted,
            rrf_k: 60.0,
            on_empty: EmptyPolicy::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature-hashing embedder; no model files needed.
    Hash,
    /// Local BGE-M3 model loaded with candle.
    Bge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model_dir: String,
    pub dim: usize,
    pub max_len: usize,
    pub timeout_ms: u64,
    pub max_concurrency: usize,
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            model_dir: "models/bge-m3".to_string(),
            dim: 1024,
            max_len: 256,
            timeout_ms: 30_000,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root, e.g. `https://api.moonshot.cn/v1`.
    pub base_url: String,
    pub model: String,
    /// Name of the env var holding the API key.
    pub api_key_env: String,
    pub timeout_ms: u64,
    pub max_context_chars: usize,
    pub max_history_turns: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.moonshot.cn/v1".to_string(),
            model: "moonshot-v1-32k".to_string(),
            api_key_env: "MOONSHOT_API_KEY".to_string(),
            timeout_ms: 60_000,
            max_context_chars: 6_000,
            max_history_turns: 10,
            temperature: 0.1,
            max_tokens: 1024,
            system_prompt: "You are a professional knowledge question-answering assistant."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Lance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: String,
    pub table: String,
    /// Upper bound on any single store call.
    pub timeout_ms: u64,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Lance,
            path: "data/lancedb".to_string(),
            table: "pdf_documents".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
