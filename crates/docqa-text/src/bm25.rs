//! Okapi BM25 over per-chunk lexical statistics.
//!
//! `score(d, q) = Σ_t idf(t) · tf(t,d)·(k1+1) / (tf(t,d) + k1·(1 − b + b·|d|/avgdl))`
//! with `idf(t) = ln(1 + (N − df(t) + 0.5) / (df(t) + 0.5))`, which is always
//! positive, so any chunk sharing a term with the query scores above zero.

use std::collections::HashMap;

use docqa_core::traits::Bm25Params;
use docqa_core::types::{rank_order, Chunk, LexicalStats};

use crate::analyzer::tokenize;

/// Build the lexical representation stored alongside a chunk.
pub fn lexical_stats(text: &str) -> LexicalStats {
    let tokens = tokenize(text);
    let mut stats = LexicalStats { length: tokens.len() as u32, ..Default::default() };
    for token in tokens {
        *stats.term_freqs.entry(token).or_insert(0) += 1;
    }
    stats
}

/// Collection-level statistics restricted to the query's terms.
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub docs: usize,
    pub avg_len: f32,
    doc_freq: HashMap<String, usize>,
}

impl CorpusStats {
    pub fn build<'a, I>(docs: I, terms: &[String]) -> Self
    where
        I: IntoIterator<Item = &'a LexicalStats>,
    {
        let mut doc_freq: HashMap<String, usize> = terms.iter().map(|t| (t.clone(), 0)).collect();
        let mut count = 0usize;
        let mut total_len = 0u64;
        for stats in docs {
            count += 1;
            total_len += u64::from(stats.length);
            for (term, df) in doc_freq.iter_mut() {
                if stats.term_freqs.contains_key(term) {
                    *df += 1;
                }
            }
        }
        let avg_len = if count == 0 { 0.0 } else { total_len as f32 / count as f32 };
        Self { docs: count, avg_len, doc_freq }
    }

    pub fn idf(&self, term: &str) -> f32 {
        let n = self.docs as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}

/// BM25 score of one chunk. Zero when it shares no term with the query.
pub fn score(
    stats: &LexicalStats,
    terms: &[String],
    corpus: &CorpusStats,
    params: Bm25Params,
) -> f32 {
    let avg_len = if corpus.avg_len > 0.0 { corpus.avg_len } else { 1.0 };
    let norm = params.k1 * (1.0 - params.b + params.b * stats.length as f32 / avg_len);
    terms
        .iter()
        .filter_map(|term| stats.term_freqs.get(term).map(|&tf| (term, tf as f32)))
        .map(|(term, tf)| corpus.idf(term) * tf * (params.k1 + 1.0) / (tf + norm))
        .sum()
}

/// Rank every chunk against `terms`, keeping the best `n` that share at least
/// one term. Ordered by descending score, then ascending chunk id.
pub fn top_n(
    docs: &[(&Chunk, &LexicalStats)],
    terms: &[String],
    n: usize,
    params: Bm25Params,
) -> Vec<(Chunk, f32)> {
    if terms.is_empty() || n == 0 {
        return Vec::new();
    }
    let corpus = CorpusStats::build(docs.iter().map(|(_, s)| *s), terms);
    let mut scored: Vec<(&Chunk, f32)> = docs
        .iter()
        .filter(|(_, stats)| terms.iter().any(|t| stats.term_freqs.contains_key(t)))
        .map(|(chunk, stats)| (*chunk, score(stats, terms, &corpus, params)))
        .collect();
    scored.sort_by(|a, b| rank_order(a.1, &a.0.id, b.1, &b.0.id));
    scored.truncate(n);
    scored.into_iter().map(|(chunk, s)| (chunk.clone(), s)).collect()
}
