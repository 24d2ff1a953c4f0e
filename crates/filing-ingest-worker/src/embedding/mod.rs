pub mod llama_server;
pub mod provider;

pub use llama_server::LlamaServerEmbedder;
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
