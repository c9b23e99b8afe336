//! docqa-text
//!
//! Text analysis (tantivy tokenizer pipeline), lexical statistics, BM25 scoring
//! and the lexical retriever.

pub mod analyzer;
pub mod bm25;
pub mod lexical;

pub use analyzer::{query_terms, tokenize};
pub use bm25::lexical_stats;
pub use lexical::LexicalRetriever;
