use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Document directory not readable: {0:?}")]
    DirectoryUnreadable(PathBuf),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Embedding count mismatch: {0} chunks, {1} vectors")]
    EmbeddingCountMismatch(usize, usize),

    #[error("Processing timed out after {0}s")]
    Timeout(u64),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
