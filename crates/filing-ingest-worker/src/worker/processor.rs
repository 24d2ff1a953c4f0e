use crate::config::Settings;
use crate::database::{ChunkMetadata, IngestionRecord, VectorStore};
use crate::document::{
    CandidateDocument, Chunk, DocumentLoader, MarkupNormalizer, NormalizedDocument, SectionChunker,
    SourceKind,
};
use crate::embedding::{EmbeddingProvider, EmbeddingRequest};
use crate::utils::error::WorkerError;
use crate::utils::Metrics;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs one filing through normalize → chunk → embed → upsert.
pub struct DocumentProcessor {
    normalized_dir: PathBuf,
    batch_size: usize,
    chunker: SectionChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    metrics: Metrics,
}

impl DocumentProcessor {
    pub fn new(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        metrics: Metrics,
    ) -> Result<Self> {
        Ok(Self {
            normalized_dir: settings.ingest.normalized_dir.clone(),
            batch_size: settings.embedding.batch_size.max(1),
            chunker: SectionChunker::new(&settings.chunking)?,
            embedder,
            store,
            metrics,
        })
    }

    /// Ingest a single filing; returns the number of chunks written.
    pub async fn process(&self, candidate: &CandidateDocument) -> Result<usize> {
        let document = self.prepare(candidate).await?;

        debug!("✂️  Chunking {}...", candidate.ticker);
        let chunks = self.chunker.chunk(&document.content);
        if chunks.is_empty() {
            return Err(WorkerError::ChunkingError(format!(
                "{} produced no chunks",
                candidate.ticker
            ))
            .into());
        }
        self.metrics.add_chunks_created(chunks.len() as u64);

        debug!("🧠 Embedding {} chunks for {}...", chunks.len(), candidate.ticker);
        let embeddings = self.embed_chunks(&chunks).await?;

        let source = document.source.display().to_string();
        let records: Vec<IngestionRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IngestionRecord {
                metadata: ChunkMetadata::new(&document.ticker, &source, chunk.index, &chunk.headers),
                content: chunk.content,
                embedding,
            })
            .collect();

        let count = records.len();
        debug!("💾 Saving {} chunks for {}...", count, candidate.ticker);
        self.store.upsert(records).await?;

        Ok(count)
    }

    /// Normalized text for a candidate, converting raw markup when needed.
    pub async fn prepare(&self, candidate: &CandidateDocument) -> Result<NormalizedDocument> {
        match candidate.kind {
            SourceKind::Normalized => DocumentLoader::load_normalized(candidate),
            SourceKind::Raw => self.normalize(candidate).await,
        }
    }

    /// Convert a raw filing and write its side file.
    ///
    /// A side file that cannot be written is logged; the normalized text is
    /// still returned with the raw path as its source.
    pub async fn normalize(&self, candidate: &CandidateDocument) -> Result<NormalizedDocument> {
        let candidate = candidate.clone();
        let dir = self.normalized_dir.clone();

        tokio::task::spawn_blocking(move || -> Result<NormalizedDocument> {
            info!("📖 Normalizing {} from {:?}", candidate.ticker, candidate.path);
            let raw = DocumentLoader::load_raw(&candidate)?;
            let mut document = MarkupNormalizer::normalize(&raw)?;

            match DocumentLoader::write_normalized(&dir, &candidate.stem, &document) {
                Ok(path) => document.source = path,
                Err(e) => warn!("⚠️  Could not write side file for {}: {:#}", candidate.ticker, e),
            }

            Ok(document)
        })
        .await
        .map_err(|e| WorkerError::Unknown(format!("normalization task failed: {}", e)))?
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let response = self.embedder.embed(EmbeddingRequest { texts }).await?;

            if response.embeddings.len() != batch.len() {
                return Err(WorkerError::EmbeddingCountMismatch(
                    batch.len(),
                    response.embeddings.len(),
                )
                .into());
            }

            self.metrics
                .add_embeddings_generated(response.embeddings.len() as u64);
            embeddings.extend(response.embeddings);
        }

        Ok(embeddings)
    }
}
