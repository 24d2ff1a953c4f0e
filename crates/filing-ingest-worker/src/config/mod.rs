pub mod settings;

pub use settings::{
    ChunkingConfig, DatabaseConfig, EmbeddingConfig, IngestConfig, Settings, WorkerConfig,
};
