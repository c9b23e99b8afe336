//! Fusion of the lexical and vector candidate lists.

use std::collections::BTreeMap;

use docqa_core::config::{FusionKind, RetrievalConfig};
use docqa_core::traits::FusionStrategy;
use docqa_core::types::{rank_order, Chunk, FusedResult, RetrievalResult};
use docqa_core::{Error, Result};

/// Min-max normalized weighted sum: `alpha * vector + (1 - alpha) * lexical`.
#[derive(Debug, Clone, Copy)]
pub struct WeightedFusion {
    alpha: f32,
}

impl WeightedFusion {
    pub fn new(alpha: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            let msg = format!("fusion alpha must be in [0, 1], got {alpha}");
            return Err(Error::InvalidConfig(msg));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

/// Scores rescaled to [0, 1] by chunk id. A single element or a zero range
/// maps everything to 1.0.
pub fn min_max(list: &[RetrievalResult]) -> BTreeMap<&str, f32> {
    let lo = list.iter().map(|r| r.score).fold(f32::INFINITY, f32::min);
    let hi = list.iter().map(|r| r.score).fold(f32::NEG_INFINITY, f32::max);
    let range = hi - lo;
    list.iter()
        .map(|r| {
            let norm = if range > 0.0 { (r.score - lo) / range } else { 1.0 };
            (r.chunk.id.as_str(), norm)
        })
        .collect()
}

impl FusionStrategy for WeightedFusion {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn fuse(
        &self,
        lexical: &[RetrievalResult],
        vector: &[RetrievalResult],
        k: usize,
    ) -> Vec<FusedResult> {
        // one retriever found nothing: rank by the other alone
        let alpha = match (lexical.is_empty(), vector.is_empty()) {
            (true, false) => 1.0,
            (false, true) => 0.0,
            _ => self.alpha,
        };
        let lex = min_max(lexical);
        let dense = min_max(vector);
        let chunks = candidates(lexical, vector);
        let scored = chunks.into_iter().map(|(id, chunk)| {
            let l = lex.get(id).copied().unwrap_or(0.0);
            let v = dense.get(id).copied().unwrap_or(0.0);
            (chunk, (alpha * v + (1.0 - alpha) * l).clamp(0.0, 1.0))
        });
        ranked(scored, k)
    }
}

/// Reciprocal rank fusion, `Σ 1/(c + rank)`, divided by the best fused value
/// so scores stay in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRankFusion {
    c: f32,
}

impl ReciprocalRankFusion {
    pub fn new(c: f32) -> Result<Self> {
        if c <= 0.0 {
            return Err(Error::InvalidConfig(format!("rrf constant must be positive, got {c}")));
        }
        Ok(Self { c })
    }
}

impl FusionStrategy for ReciprocalRankFusion {
    fn name(&self) -> &'static str {
        "rrf"
    }

    fn fuse(
        &self,
        lexical: &[RetrievalResult],
        vector: &[RetrievalResult],
        k: usize,
    ) -> Vec<FusedResult> {
        let mut raw: BTreeMap<&str, f32> = BTreeMap::new();
        for list in [lexical, vector] {
            for (i, r) in list.iter().enumerate() {
                *raw.entry(r.chunk.id.as_str()).or_insert(0.0) += 1.0 / (self.c + (i + 1) as f32);
            }
        }
        let best = raw.values().copied().fold(0.0, f32::max);
        let chunks = candidates(lexical, vector);
        let scored = chunks.into_iter().map(|(id, chunk)| {
            let s = raw.get(id).copied().unwrap_or(0.0);
            (chunk, if best > 0.0 { (s / best).clamp(0.0, 1.0) } else { 0.0 })
        });
        ranked(scored, k)
    }
}

pub fn build_fusion(cfg: &RetrievalConfig) -> Result<Box<dyn FusionStrategy>> {
    let strategy: Box<dyn FusionStrategy> = match cfg.fusion {
        FusionKind::Weighted => Box::new(WeightedFusion::new(cfg.alpha)?),
        FusionKind::Rrf => Box::new(ReciprocalRankFusion::new(cfg.rrf_k)?),
    };
    Ok(strategy)
}

fn candidates<'a>(
    lexical: &'a [RetrievalResult],
    vector: &'a [RetrievalResult],
) -> BTreeMap<&'a str, &'a Chunk> {
    let mut all = BTreeMap::new();
    for r in lexical.iter().chain(vector) {
        all.entry(r.chunk.id.as_str()).or_insert(&r.chunk);
    }
    all
}

fn ranked<'a>(scored: impl Iterator<Item = (&'a Chunk, f32)>, k: usize) -> Vec<FusedResult> {
    let mut scored: Vec<(&Chunk, f32)> = scored.collect();
    scored.sort_by(|a, b| rank_order(a.1, &a.0.id, b.1, &b.0.id));
    scored
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, (chunk, score))| FusedResult { chunk: chunk.clone(), score, rank: i + 1 })
        .collect()
}
