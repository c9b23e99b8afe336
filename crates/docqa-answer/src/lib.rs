//! docqa-answer
//!
//! Context assembly, citation mapping and the language-model client that
//! turn fused retrieval results into an [`Answer`](docqa_core::types::Answer).

pub mod assembler;
pub mod citations;
pub mod context;
pub mod openai;
pub mod service;

pub use assembler::AnswerAssembler;
pub use citations::{build_citations, referenced_markers};
pub use context::{build_context, render_context};
pub use openai::OpenAiGenerator;
pub use service::QaService;
