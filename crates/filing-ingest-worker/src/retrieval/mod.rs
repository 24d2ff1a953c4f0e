use crate::database::{SearchHit, VectorStore};
use crate::embedding::EmbeddingProvider;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Query side of the index: embed a question, return the nearest chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Top `k` chunks for `query`, closest first.
    ///
    /// `ticker` matches the stored upper-case value exactly.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        ticker: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_single(query.to_string()).await?;
        let hits = self
            .store
            .similarity_search(&vector, k, ticker.map(str::to_string))
            .await?;

        debug!("🔎 {} hits for {:?} (ticker {:?})", hits.len(), query, ticker);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ChunkMetadata, MockVectorStore};
    use crate::document::HeaderContext;
    use crate::embedding::provider::MockEmbeddingProvider;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_search_embeds_query_and_filters_ticker() {
        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed_single()
            .with(eq("What drove revenue growth?".to_string()))
            .times(1)
            .returning(|_| Ok(vec![0.1, 0.2, 0.3]));

        let mut store = MockVectorStore::new();
        store
            .expect_similarity_search()
            .withf(|query, k, ticker| {
                query.to_vec() == vec![0.1f32, 0.2, 0.3] && *k == 4 && ticker.as_deref() == Some("AAPL")
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![SearchHit {
                    content: "Services revenue grew 13%.".to_string(),
                    metadata: ChunkMetadata::new("AAPL", "mds/AAPL.md", 7, &HeaderContext::default()),
                    score: 0.42,
                    created_at: None,
                }])
            });

        let retriever = Retriever::new(Arc::new(embedder), Arc::new(store));
        let hits = retriever
            .similarity_search("What drove revenue growth?", 4, Some("AAPL"))
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.chunk_index, 7);
    }

    #[tokio::test]
    async fn test_zero_k_skips_collaborators() {
        let retriever = Retriever::new(
            Arc::new(MockEmbeddingProvider::new()),
            Arc::new(MockVectorStore::new()),
        );
        assert!(retriever.similarity_search("anything", 0, None).await.unwrap().is_empty());
    }
}
