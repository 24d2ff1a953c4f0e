use super::{IngestionRecord, SearchHit};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Vector index holding embedded chunks and their JSON metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Distinct values of a top-level metadata field across the collection.
    async fn distinct_metadata_values(&self, field: &str) -> Result<HashSet<String>>;

    /// Append records; returns the number written.
    async fn upsert(&self, records: Vec<IngestionRecord>) -> Result<u64>;

    /// Nearest `k` chunks to `query`, optionally restricted to one ticker.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        ticker: Option<String>,
    ) -> Result<Vec<SearchHit>>;
}
