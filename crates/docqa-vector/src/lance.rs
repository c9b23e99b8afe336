//! LanceDB-backed chunk store.
//!
//! One row per chunk. Upserts go through `merge_insert` keyed on `id`, so a
//! chunk's text, metadata, embedding and term counts land in a single commit.
//! Vector search uses LanceDB's cosine distance; BM25 scans the term counts.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use async_trait::async_trait;
use docqa_core::traits::{Bm25Params, ChunkStore};
use docqa_core::types::{rank_order, Chunk, DocumentSummary, LexicalStats, StoredChunk};
use docqa_core::{Error, Result};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, DistanceType, Table};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::memory::sorted_summaries;
use crate::schema::{build_arrow_schema, vector_dim};
use crate::similarity::cosine;

const CHUNK_COLUMNS: &[&str] =
    &["id", "doc_id", "source", "ordinal", "text", "page", "page_end", "start_char", "end_char"];

pub struct LanceStore {
    table: Table,
    dim: usize,
    // lance commits are optimistic; serialize our own writers
    write_lock: Mutex<()>,
}

impl LanceStore {
    /// Open (creating if needed) `table_name` under `db_path`. Fails with
    /// `InvalidConfig` if an existing table was built for another dimension.
    pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        let db = connect(db_path.to_string_lossy().as_ref()).execute().await.map_err(Error::store)?;
        let names = db.table_names().execute().await.map_err(Error::store)?;
        if !names.contains(&table_name.to_string()) {
            let schema = build_arrow_schema(dim);
            // create empty table with 0 rows
            let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
            db.create_table(table_name, Box::new(iter)).execute().await.map_err(Error::store)?;
            info!(table = table_name, dim, "created chunk table");
        }
        let table = db.open_table(table_name).execute().await.map_err(Error::store)?;
        let schema = table.schema().await.map_err(Error::store)?;
        match vector_dim(&schema) {
            Some(existing) if existing == dim => {}
            Some(existing) => {
                return Err(Error::InvalidConfig(format!(
                    "table {table_name} stores {existing}-dimensional vectors, \
                     embedder produces {dim}"
                )))
            }
            None => {
                let msg = format!("table {table_name} has no vector column");
                return Err(Error::InvalidConfig(msg));
            }
        }
        Ok(Self { table, dim, write_lock: Mutex::new(()) })
    }

    async fn scan(&self, columns: &[&str], filter: Option<String>) -> Result<Vec<RecordBatch>> {
        let mut query = self.table.query().select(Select::columns(columns));
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }
        let stream = query.execute().await.map_err(Error::store)?;
        stream.try_collect().await.map_err(Error::store)
    }

    /// Cosine over every stored vector. Used when rows tied at the cut may
    /// lie outside the window LanceDB returned.
    async fn exact_top_n_vector(&self, query: &[f32], n: usize) -> Result<Vec<(Chunk, f32)>> {
        let mut columns = CHUNK_COLUMNS.to_vec();
        columns.push("vector");
        let batches = self.scan(&columns, None).await?;
        let mut hits = Vec::new();
        for batch in &batches {
            let vectors = column::<FixedSizeListArray>(batch, "vector")?;
            for i in 0..batch.num_rows() {
                let row = vectors.value(i);
                let score = cosine(query, row.as_primitive::<Float32Type>().values());
                hits.push((read_chunk(batch, i)?, score));
            }
        }
        hits.sort_by(|a, b| rank_order(a.1, &a.0.id, b.1, &b.0.id));
        hits.truncate(n);
        Ok(hits)
    }
}

/// True when the window came back full and the n-th score equals the last
/// one, so rows with that score may have been left out.
fn tie_reaches_window_edge(sorted: &[(Chunk, f32)], n: usize, limit: usize) -> bool {
    if sorted.len() < limit || sorted.len() <= n {
        return false;
    }
    match (sorted.get(n - 1), sorted.last()) {
        (Some((_, cut)), Some((_, edge))) => (cut - edge).abs() <= f32::EPSILON,
        _ => false,
    }
}

#[async_trait]
impl ChunkStore for LanceStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn upsert(&self, record: StoredChunk) -> Result<()> {
        if record.embedding.len() != self.dim {
            return Err(Error::StoreUnavailable(format!(
                "embedding dimension {} does not match store dimension {}",
                record.embedding.len(),
                self.dim
            )));
        }
        let batch = to_record_batch(&record, self.dim)?;
        let schema = build_arrow_schema(self.dim);
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let _guard = self.write_lock.lock().await;
        // Upsert behavior via merge_insert: id is unique
        let mut mi = self.table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(Error::store)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredChunk>> {
        let mut columns = CHUNK_COLUMNS.to_vec();
        columns.extend(["lex_len", "terms", "vector"]);
        let batches = self.scan(&columns, Some(format!("id = {}", quote(id)))).await?;
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let chunk = read_chunk(batch, 0)?;
            let lexical = read_lexical(batch, 0)?;
            let vectors = column::<FixedSizeListArray>(batch, "vector")?;
            let embedding = vectors.value(0).as_primitive::<Float32Type>().values().to_vec();
            return Ok(Some(StoredChunk { chunk, embedding, lexical }));
        }
        Ok(None)
    }

    async fn top_n_bm25(
        &self,
        terms: &[String],
        n: usize,
        params: Bm25Params,
    ) -> Result<Vec<(Chunk, f32)>> {
        if terms.is_empty() || n == 0 {
            return Ok(Vec::new());
        }
        let mut columns = CHUNK_COLUMNS.to_vec();
        columns.extend(["lex_len", "terms"]);
        let batches = self.scan(&columns, None).await?;
        let mut rows = Vec::new();
        for batch in &batches {
            for i in 0..batch.num_rows() {
                rows.push((read_chunk(batch, i)?, read_lexical(batch, i)?));
            }
        }
        let docs: Vec<(&Chunk, &LexicalStats)> = rows.iter().map(|(c, s)| (c, s)).collect();
        Ok(docqa_text::bm25::top_n(&docs, terms, n, params))
    }

    async fn top_n_vector(&self, query: &[f32], n: usize) -> Result<Vec<(Chunk, f32)>> {
        if n == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }
        // over-fetch so equal-distance rows at the cut are ordered by id, not by scan order
        let limit = n.saturating_mul(2).max(n + 8);
        let stream = self
            .table
            .vector_search(query.to_vec())
            .map_err(Error::store)?
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(CHUNK_COLUMNS))
            .limit(limit)
            .execute()
            .await
            .map_err(Error::store)?;
        let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(Error::store)?;
        let mut hits = Vec::new();
        for batch in &batches {
            let distances = column::<Float32Array>(batch, "_distance")?;
            for i in 0..batch.num_rows() {
                // cosine distance = 1 - similarity
                hits.push((read_chunk(batch, i)?, 1.0 - distances.value(i)));
            }
        }
        hits.sort_by(|a, b| rank_order(a.1, &a.0.id, b.1, &b.0.id));
        if tie_reaches_window_edge(&hits, n, limit) {
            debug!(n, limit, "tie spans the search window, scoring every row");
            return self.exact_top_n_vector(query, n).await;
        }
        hits.truncate(n);
        debug!(hits = hits.len(), "lance vector search");
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(Error::store)
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>> {
        let batches = self.scan(&["doc_id", "source"], None).await?;
        let mut by_doc: HashMap<String, DocumentSummary> = HashMap::new();
        for batch in &batches {
            let doc_ids = column::<StringArray>(batch, "doc_id")?;
            let sources = column::<StringArray>(batch, "source")?;
            for i in 0..batch.num_rows() {
                by_doc
                    .entry(doc_ids.value(i).to_string())
                    .or_insert_with(|| DocumentSummary {
                        doc_id: doc_ids.value(i).to_string(),
                        source: sources.value(i).to_string(),
                        chunks: 0,
                    })
                    .chunks += 1;
            }
        }
        Ok(sorted_summaries(by_doc.into_values().collect()))
    }

    async fn remove_document(&self, doc_id: &str) -> Result<usize> {
        let filter = format!("doc_id = {}", quote(doc_id));
        let _guard = self.write_lock.lock().await;
        let n = self.table.count_rows(Some(filter.clone())).await.map_err(Error::store)?;
        if n > 0 {
            self.table.delete(&filter).await.map_err(Error::store)?;
        }
        Ok(n)
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.table.delete("id IS NOT NULL").await.map_err(Error::store)?;
        Ok(())
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::StoreUnavailable(format!("column {name} missing or mistyped")))
}

fn read_chunk(batch: &RecordBatch, i: usize) -> Result<Chunk> {
    Ok(Chunk {
        id: column::<StringArray>(batch, "id")?.value(i).to_string(),
        doc_id: column::<StringArray>(batch, "doc_id")?.value(i).to_string(),
        source: column::<StringArray>(batch, "source")?.value(i).to_string(),
        ordinal: column::<Int32Array>(batch, "ordinal")?.value(i) as usize,
        text: column::<StringArray>(batch, "text")?.value(i).to_string(),
        page: column::<Int32Array>(batch, "page")?.value(i) as u32,
        page_end: column::<Int32Array>(batch, "page_end")?.value(i) as u32,
        start: column::<Int64Array>(batch, "start_char")?.value(i) as usize,
        end: column::<Int64Array>(batch, "end_char")?.value(i) as usize,
    })
}

fn read_lexical(batch: &RecordBatch, i: usize) -> Result<LexicalStats> {
    let length = column::<Int32Array>(batch, "lex_len")?.value(i) as u32;
    let raw = column::<StringArray>(batch, "terms")?.value(i);
    let term_freqs: BTreeMap<String, u32> = serde_json::from_str(raw).map_err(Error::store)?;
    Ok(LexicalStats { length, term_freqs })
}

fn to_record_batch(record: &StoredChunk, dim: usize) -> Result<RecordBatch> {
    let c = &record.chunk;
    let terms = serde_json::to_string(&record.lexical.term_freqs).map_err(Error::store)?;
    let vectors = vec![Some(record.embedding.iter().map(|&x| Some(x)).collect::<Vec<_>>())];
    RecordBatch::try_new(
        build_arrow_schema(dim),
        vec![
            Arc::new(StringArray::from(vec![c.id.clone()])),
            Arc::new(StringArray::from(vec![c.doc_id.clone()])),
            Arc::new(StringArray::from(vec![c.source.clone()])),
            Arc::new(Int32Array::from(vec![c.ordinal as i32])),
            Arc::new(StringArray::from(vec![c.text.clone()])),
            Arc::new(Int32Array::from(vec![c.page as i32])),
            Arc::new(Int32Array::from(vec![c.page_end as i32])),
            Arc::new(Int64Array::from(vec![c.start as i64])),
            Arc::new(Int64Array::from(vec![c.end as i64])),
            Arc::new(Int32Array::from(vec![record.lexical.length as i32])),
            Arc::new(StringArray::from(vec![terms])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                vectors.into_iter(),
                dim as i32,
            )),
        ],
    )
    .map_err(Error::store)
}
