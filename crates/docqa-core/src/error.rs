use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Document has no extractable text: {0}")]
    EmptyDocument(String),

    #[error("Embedding service failed: {0}")]
    EmbeddingService(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Generation service failed: {0}")]
    GenerationService(String),

    #[error("No relevant chunks found")]
    NoResults,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a backend failure as [`Error::StoreUnavailable`].
    pub fn store<E: std::fmt::Display>(e: E) -> Self {
        Error::StoreUnavailable(e.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(e: E) -> Self {
        Error::EmbeddingService(e.to_string())
    }

    pub fn generation<E: std::fmt::Display>(e: E) -> Self {
        Error::GenerationService(e.to_string())
    }
}
