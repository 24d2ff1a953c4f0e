use super::processor::DocumentProcessor;
use super::report::{DocumentOutcome, RunReport};
use crate::config::Settings;
use crate::database::VectorStore;
use crate::document::{CandidateDocument, DocumentLoader, SourceKind};
use crate::embedding::EmbeddingProvider;
use crate::utils::error::WorkerError;
use crate::utils::{Metrics, Timer};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const TICKER_FIELD: &str = "ticker";

/// Batch driver: discover filings, skip those already indexed, ingest the rest.
///
/// Failures are isolated per filing; only an unreadable input tree aborts a run.
pub struct IngestionController {
    settings: Settings,
    processor: Arc<DocumentProcessor>,
    store: Arc<dyn VectorStore>,
    metrics: Metrics,
}

impl IngestionController {
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let metrics = Metrics::new();
        let processor = Arc::new(DocumentProcessor::new(
            &settings,
            embedder,
            store.clone(),
            metrics.clone(),
        )?);

        Ok(Self {
            settings,
            processor,
            store,
            metrics,
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn discover(&self) -> Result<Vec<CandidateDocument>> {
        DocumentLoader::discover(&self.settings.ingest)
    }

    /// Upper-cased tickers with at least one chunk in the index.
    ///
    /// Any store error yields the empty set, so every candidate is processed.
    pub async fn already_ingested(&self) -> HashSet<String> {
        match self.store.distinct_metadata_values(TICKER_FIELD).await {
            Ok(tickers) => tickers.into_iter().map(|t| t.to_uppercase()).collect(),
            Err(e) => {
                warn!("⚠️  Resume check failed, processing every filing: {:#}", e);
                HashSet::new()
            }
        }
    }

    /// Candidates not yet indexed, in ticker order, plus the skipped count.
    pub fn plan(
        mut candidates: Vec<CandidateDocument>,
        processed: &HashSet<String>,
    ) -> (Vec<CandidateDocument>, usize) {
        let total = candidates.len();
        candidates.retain(|c| !processed.contains(&c.ticker.to_uppercase()));
        candidates.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        let skipped = total - candidates.len();
        (candidates, skipped)
    }

    /// Full ingestion run: discover, resume, plan, process.
    pub async fn ingest(&self) -> Result<RunReport> {
        info!("🚀 Starting ingestion run...");

        let candidates = self.discover()?;
        info!("Found {} candidate filings", candidates.len());

        let processed = self.already_ingested().await;
        let (plan, skipped) = Self::plan(candidates, &processed);
        self.metrics.add_documents_skipped(skipped as u64);

        if plan.is_empty() {
            info!("✅ All filings already ingested ({} skipped)", skipped);
        } else {
            info!("📦 {} filings to ingest, {} already present", plan.len(), skipped);
        }

        let outcomes = self.run(plan).await;
        let report = RunReport::new(skipped, outcomes);
        self.metrics.log_summary();

        Ok(report)
    }

    /// Process a plan with bounded concurrency and a per-filing timeout.
    pub async fn run(&self, plan: Vec<CandidateDocument>) -> Vec<DocumentOutcome> {
        let total = plan.len();
        let limit_secs = self.settings.worker.processing_timeout_seconds;
        let concurrency = self.settings.worker.concurrency.max(1);

        stream::iter(plan.into_iter().enumerate())
            .map(|(position, candidate)| {
                let processor = self.processor.clone();
                async move {
                    info!("📄 [{}/{}] Ingesting {}", position + 1, total, candidate.ticker);
                    let timer = Timer::new();

                    let result = tokio::time::timeout(
                        Duration::from_secs(limit_secs),
                        processor.process(&candidate),
                    )
                    .await
                    .unwrap_or_else(|_| Err(WorkerError::Timeout(limit_secs).into()));

                    self.metrics.add_processing_time(timer.elapsed());
                    self.record(candidate.ticker, result.map(|chunks| (chunks, None)))
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Convert raw filings into Markdown side files without touching the index.
    pub async fn normalize_all(&self) -> Result<RunReport> {
        info!("🚀 Starting normalize-only run...");

        let candidates = self.discover()?;
        let (raw, existing): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| c.kind == SourceKind::Raw);
        self.metrics.add_documents_skipped(existing.len() as u64);

        let concurrency = self.settings.worker.concurrency.max(1);
        let outcomes: Vec<DocumentOutcome> = stream::iter(raw)
            .map(|candidate| {
                let processor = self.processor.clone();
                async move {
                    let timer = Timer::new();
                    let result = processor
                        .normalize(&candidate)
                        .await
                        .map(|doc| (0, Some(doc.source)));
                    self.metrics.add_processing_time(timer.elapsed());
                    self.record(candidate.ticker, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let report = RunReport::new(existing.len(), outcomes);
        self.metrics.log_summary();

        Ok(report)
    }

    fn record(
        &self,
        ticker: String,
        result: Result<(usize, Option<std::path::PathBuf>)>,
    ) -> DocumentOutcome {
        match result {
            Ok((_, Some(path))) => {
                self.metrics.increment_documents_processed();
                info!("✅ Normalized {} into {:?}", ticker, path);
                DocumentOutcome::Normalized { ticker, path }
            }
            Ok((chunks, None)) => {
                self.metrics.increment_documents_processed();
                info!("✅ Ingested {} ({} chunks)", ticker, chunks);
                DocumentOutcome::Ingested { ticker, chunks }
            }
            Err(e) => {
                self.metrics.increment_documents_failed();
                let reason = format!("{:#}", e);
                error!(ticker = %ticker, "❌ Failed to process {}: {}", ticker, reason);
                DocumentOutcome::Failed { ticker, reason }
            }
        }
    }
}
