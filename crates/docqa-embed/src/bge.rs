//! BGE-M3 dense embeddings: XLM-RoBERTa encoder, masked mean pooling, L2.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, ensure, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use docqa_core::traits::Embedder;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// XLM-R pad token id.
const PAD_ID: u32 = 1;

pub struct BgeEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    id: String,
}

impl BgeEmbedder {
    /// Load tokenizer, config and weights from `model_dir`. Accepts either
    /// `model.safetensors` or `pytorch_model.bin`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e)
        })?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw)?;
        let dim = config.hidden_size;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, max_len, "BGE-M3 loaded");
        let id = format!("bge-m3:d{dim}");
        Ok(Self { model, tokenizer, device, dim, max_len, id })
    }

    /// Encode a batch to `[B, max_len]` id and mask tensors, truncating or
    /// padding each row.
    fn encode(&self, texts: &[String]) -> Result<(Tensor, Tensor)> {
        let len = self.max_len;
        let mut ids = Vec::with_capacity(texts.len() * len);
        let mut mask = Vec::with_capacity(texts.len() * len);
        for text in texts {
            let enc = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
            let kept = enc.get_ids().len().min(len);
            ids.extend_from_slice(&enc.get_ids()[..kept]);
            mask.extend_from_slice(&enc.get_attention_mask()[..kept]);
            ids.resize(ids.len() + len - kept, PAD_ID);
            mask.resize(mask.len() + len - kept, 0);
        }
        let input_ids = Tensor::from_vec(ids, (texts.len(), len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (texts.len(), len), &self.device)?;
        Ok((input_ids, attention_mask))
    }

    fn forward(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = self.encode(texts)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden =
            self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        let ms = start.elapsed().as_millis() as u64;
        if ms > 100 * texts.len() as u64 {
            warn!(batch = texts.len(), ms, "slow embedding batch");
        } else {
            debug!(batch = texts.len(), ms, "embedded batch");
        }
        Ok(vectors)
    }
}

impl Embedder for BgeEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.forward(texts)
    }
}

/// Mean of the unmasked token states, L2-normalized per row: `[B, T, H] -> [B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _, hidden_dim) = hidden.dims3()?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    // rows with no unmasked token pool to zero instead of NaN
    let counts = mask.sum(1)?.maximum(1.0)?;
    let mean = summed.broadcast_div(&counts)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-12)?;
    let pooled = mean.broadcast_div(&norm)?;
    ensure!(pooled.dims() == [batch, hidden_dim], "pooled shape mismatch: {:?}", pooled.dims());
    Ok(pooled)
}

fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("embedding device: metal");
            return dev;
        }
    }
    info!("embedding device: cpu");
    Device::Cpu
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let tensors = candle_core::pickle::read_all(&pickle)
        .with_context(|| format!("reading {}", pickle.display()))?;
    tensors
        .into_iter()
        .map(|(name, t)| Ok::<_, anyhow::Error>((name, t.to_device(device)?)))
        .collect()
}

/// First existing directory among the configured one, `MODEL_DIR`, and the
/// conventional `models/bge-m3` locations.
pub fn resolve_model_dir(configured: &Path) -> Result<PathBuf> {
    let mut candidates = vec![configured.to_path_buf()];
    if let Ok(dir) = std::env::var("MODEL_DIR") {
        candidates.push(PathBuf::from(dir));
    }
    candidates.push(PathBuf::from("../models/bge-m3"));
    candidates.push(PathBuf::from("models/bge-m3"));
    candidates.into_iter().find(|p| p.join("tokenizer.json").exists()).ok_or_else(|| {
        anyhow!("Could not locate BGE-M3 model directory (tried {})", configured.display())
    })
}
