//! docqa-hybrid
//!
//! Indexing, fusion of lexical and vector retrieval, and the `KnowledgeBase`
//! facade the CLI and answer service are built on.

pub mod fusion;
pub mod indexer;
pub mod knowledge_base;
pub mod pipeline;

pub use fusion::{build_fusion, ReciprocalRankFusion, WeightedFusion};
pub use indexer::{IndexReport, Indexer};
pub use knowledge_base::{IngestOutcome, KnowledgeBase, KnowledgeBaseStatus};
pub use pipeline::QueryPipeline;
