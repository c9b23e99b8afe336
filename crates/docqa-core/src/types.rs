//! Domain types shared by the chunker, stores, retrievers and answer assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

pub type ChunkId = String;
pub type DocumentId = String;

/// An ingested source document. Immutable once created; re-ingesting the same
/// source yields a new `Document` with a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_timestamp(source, Utc::now())
    }

    pub fn with_timestamp(source: impl Into<String>, ingested_at: DateTime<Utc>) -> Self {
        let source = source.into();
        let stem = Path::new(&source)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "doc".to_string());
        let stamp =
            ingested_at.timestamp_nanos_opt().unwrap_or_else(|| ingested_at.timestamp_micros());
        let digest = blake3::hash(format!("{source}\0{stamp}").as_bytes()).to_hex().to_string();
        let id = format!("{}-{}", sanitize_id(&stem), &digest[..12]);
        Self { id, source, ingested_at }
    }
}

fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Text of a single page as supplied by the document-processing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self { number, text: text.into() }
    }
}

/// A bounded span of a document's text; the unit of indexing and retrieval.
///
/// - `id`: unique within the knowledge base (`<doc_id>:<ordinal>`)
/// - `page`/`page_end`: 1-based pages spanned by the chunk
/// - `start`/`end`: character offsets into the joined document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: DocumentId,
    pub source: String,
    pub ordinal: usize,
    pub text: String,
    pub page: u32,
    pub page_end: u32,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn chunk_id(doc_id: &str, ordinal: usize) -> ChunkId {
        format!("{doc_id}:{ordinal:06}")
    }
}

/// Lexical representation of a chunk: analyzed length and term counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalStats {
    pub length: u32,
    pub term_freqs: BTreeMap<String, u32>,
}

/// Everything persisted for one chunk. Written as a single unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub lexical: LexicalStats,
}

/// Indicates which retriever produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Lexical,
    Vector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    pub method: RetrievalMethod,
}

/// A fused result. `rank` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}

/// Per-document view of what the store currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: DocumentId,
    pub source: String,
    pub chunks: usize,
}

/// A chunk as placed in the generation context under marker `[marker]`.
/// `text` may be truncated to fit the context budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub marker: usize,
    pub chunk: Chunk,
    pub text: String,
}

/// Pointer from a generated answer back to the chunk that supported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Context marker (`[n]`) the chunk was presented under.
    pub marker: usize,
    pub chunk_id: ChunkId,
    pub doc_id: DocumentId,
    pub source: String,
    pub page: u32,
    pub page_end: u32,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// Descending score, then ascending id. Every ranked list in the workspace
/// is ordered by this.
pub fn rank_order(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}
