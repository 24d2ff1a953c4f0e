use std::path::PathBuf;

/// Result of one filing within a run.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    Ingested { ticker: String, chunks: usize },
    Normalized { ticker: String, path: PathBuf },
    Failed { ticker: String, reason: String },
}

impl DocumentOutcome {
    pub fn ticker(&self) -> &str {
        match self {
            Self::Ingested { ticker, .. }
            | Self::Normalized { ticker, .. }
            | Self::Failed { ticker, .. } => ticker,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Sorted by ticker.
    pub outcomes: Vec<DocumentOutcome>,
}

impl RunReport {
    pub fn new(skipped: usize, mut outcomes: Vec<DocumentOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.ticker().cmp(b.ticker()));
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();

        Self {
            processed: outcomes.len() - failed,
            skipped,
            failed,
            outcomes,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_and_orders() {
        let report = RunReport::new(
            3,
            vec![
                DocumentOutcome::Failed {
                    ticker: "MSFT".to_string(),
                    reason: "boom".to_string(),
                },
                DocumentOutcome::Ingested {
                    ticker: "AAPL".to_string(),
                    chunks: 10,
                },
            ],
        );

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.outcomes[0].ticker(), "AAPL");
        assert_eq!(report.failures().count(), 1);
    }
}
