use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Chunk, Document, Page};

/// Separator placed between consecutive pages when building the document text.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Sizes are in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1024, chunk_overlap: 200 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Full text of a document plus the character offset where each page starts.
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub text: String,
    page_starts: Vec<(usize, u32)>,
}

impl DocumentText {
    pub fn from_pages(pages: &[Page]) -> Self {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        let mut offset = 0usize;
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                text.push_str(PAGE_SEPARATOR);
                offset += PAGE_SEPARATOR.chars().count();
            }
            page_starts.push((offset, page.number));
            text.push_str(&page.text);
            offset += page.text.chars().count();
        }
        Self { text, page_starts }
    }

    /// Page containing the character at `offset`.
    pub fn page_at(&self, offset: usize) -> u32 {
        let idx = self.page_starts.partition_point(|(start, _)| *start <= offset);
        self.page_starts.get(idx.saturating_sub(1)).map_or(1, |(_, n)| *n)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split a document's pages into overlapping chunks covering the whole text.
    pub fn chunk(&self, doc: &Document, pages: &[Page]) -> Result<Vec<Chunk>> {
        let doc_text = DocumentText::from_pages(pages);
        if doc_text.text.trim().is_empty() {
            return Err(Error::EmptyDocument(doc.source.clone()));
        }

        let chars: Vec<char> = doc_text.text.chars().collect();
        let len = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let mut end = (start + size).min(len);
            if end < len {
                end = snap_to_whitespace(&chars, start + overlap + 1, end, size / 5);
            }
            let ordinal = chunks.len();
            chunks.push(Chunk {
                id: Chunk::chunk_id(&doc.id, ordinal),
                doc_id: doc.id.clone(),
                source: doc.source.clone(),
                ordinal,
                text: chars[start..end].iter().collect(),
                page: doc_text.page_at(start),
                page_end: doc_text.page_at(end.saturating_sub(1)),
                start,
                end,
            });
            if end >= len {
                break;
            }
            start = end - overlap;
        }
        debug!(doc_id = %doc.id, chars = len, chunks = chunks.len(), "chunked document");
        Ok(chunks)
    }

    pub fn chunk_text(&self, doc: &Document, text: &str) -> Result<Vec<Chunk>> {
        self.chunk(doc, &[Page::new(1, text)])
    }
}

/// Move a cut at `end` back to just after the nearest whitespace, looking no
/// further back than `window` characters and never below `floor`.
fn snap_to_whitespace(chars: &[char], floor: usize, end: usize, window: usize) -> usize {
    if chars[end].is_whitespace() || chars[end - 1].is_whitespace() {
        return end;
    }
    let lowest = end.saturating_sub(window).max(floor);
    (lowest..end).rev().find(|&p| p > 0 && chars[p - 1].is_whitespace()).unwrap_or(end)
}

/// Rebuild the document text from its chunks by dropping overlapping prefixes.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for c in chunks {
        let skip = covered.saturating_sub(c.start);
        out.extend(c.text.chars().skip(skip));
        covered = covered.max(c.end);
    }
    out
}
