use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Run-level counters shared between concurrently processed documents.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    documents_processed: AtomicU64,
    documents_skipped: AtomicU64,
    documents_failed: AtomicU64,
    chunks_created: AtomicU64,
    total_processing_time_ms: AtomicU64,
    embeddings_generated: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                documents_processed: AtomicU64::new(0),
                documents_skipped: AtomicU64::new(0),
                documents_failed: AtomicU64::new(0),
                chunks_created: AtomicU64::new(0),
                total_processing_time_ms: AtomicU64::new(0),
                embeddings_generated: AtomicU64::new(0),
            }),
        }
    }

    pub fn increment_documents_processed(&self) {
        self.inner.documents_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_documents_skipped(&self, count: u64) {
        self.inner.documents_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_documents_failed(&self) {
        self.inner.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_chunks_created(&self, count: u64) {
        self.inner.chunks_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_processing_time(&self, duration: Duration) {
        self.inner
            .total_processing_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn add_embeddings_generated(&self, count: u64) {
        self.inner.embeddings_generated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_documents_processed(&self) -> u64 {
        self.inner.documents_processed.load(Ordering::Relaxed)
    }

    pub fn get_documents_skipped(&self) -> u64 {
        self.inner.documents_skipped.load(Ordering::Relaxed)
    }

    pub fn get_documents_failed(&self) -> u64 {
        self.inner.documents_failed.load(Ordering::Relaxed)
    }

    pub fn get_chunks_created(&self) -> u64 {
        self.inner.chunks_created.load(Ordering::Relaxed)
    }

    pub fn get_total_processing_time_ms(&self) -> u64 {
        self.inner.total_processing_time_ms.load(Ordering::Relaxed)
    }

    pub fn get_embeddings_generated(&self) -> u64 {
        self.inner.embeddings_generated.load(Ordering::Relaxed)
    }

    pub fn get_average_processing_time_ms(&self) -> f64 {
        let processed = self.get_documents_processed();
        if processed == 0 {
            return 0.0;
        }

        let total_time = self.get_total_processing_time_ms();
        total_time as f64 / processed as f64
    }

    pub fn log_summary(&self) {
        info!(
            processed = self.get_documents_processed(),
            skipped = self.get_documents_skipped(),
            failed = self.get_documents_failed(),
            chunks = self.get_chunks_created(),
            embeddings = self.get_embeddings_generated(),
            "📊 Run summary: {} processed, {} skipped, {} failed",
            self.get_documents_processed(),
            self.get_documents_skipped(),
            self.get_documents_failed()
        );
        info!(
            "Average processing time: {:.2}ms, total: {:.2}s",
            self.get_average_processing_time_ms(),
            self.get_total_processing_time_ms() as f64 / 1000.0
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer helper to measure per-document duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_shared_between_clones() {
        let metrics = Metrics::new();
        let handle = metrics.clone();

        handle.increment_documents_processed();
        handle.increment_documents_failed();
        handle.add_documents_skipped(4);
        handle.add_chunks_created(12);

        assert_eq!(metrics.get_documents_processed(), 1);
        assert_eq!(metrics.get_documents_failed(), 1);
        assert_eq!(metrics.get_documents_skipped(), 4);
        assert_eq!(metrics.get_chunks_created(), 12);
    }

    #[test]
    fn test_average_without_documents() {
        let metrics = Metrics::new();
        metrics.add_processing_time(Duration::from_millis(500));
        assert_eq!(metrics.get_average_processing_time_ms(), 0.0);

        metrics.increment_documents_processed();
        metrics.increment_documents_processed();
        assert_eq!(metrics.get_average_processing_time_ms(), 250.0);
    }
}
