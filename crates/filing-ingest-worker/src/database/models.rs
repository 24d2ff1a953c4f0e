use crate::document::HeaderContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON metadata stored alongside every chunk (`cmetadata`).
///
/// Header keys keep the `Header 1/2/3` spelling consumed by the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub ticker: String,
    pub source: String,
    pub chunk_index: usize,
    #[serde(rename = "Header 1", default, skip_serializing_if = "Option::is_none")]
    pub header_1: Option<String>,
    #[serde(rename = "Header 2", default, skip_serializing_if = "Option::is_none")]
    pub header_2: Option<String>,
    #[serde(rename = "Header 3", default, skip_serializing_if = "Option::is_none")]
    pub header_3: Option<String>,
}

impl ChunkMetadata {
    pub fn new(ticker: &str, source: &str, chunk_index: usize, headers: &HeaderContext) -> Self {
        Self {
            ticker: ticker.to_string(),
            source: source.to_string(),
            chunk_index,
            header_1: headers.h1.clone(),
            header_2: headers.h2.clone(),
            header_3: headers.h3.clone(),
        }
    }
}

/// A chunk ready for the index.
#[derive(Debug, Clone)]
pub struct IngestionRecord {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// L2 distance to the query; lower is closer.
    pub score: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_uses_header_keys() {
        let headers = HeaderContext {
            h1: Some("Part II".to_string()),
            h2: Some("Item 7".to_string()),
            h3: None,
        };
        let meta = ChunkMetadata::new("AAPL", "mds/AAPL.md", 4, &headers);

        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({
                "ticker": "AAPL",
                "source": "mds/AAPL.md",
                "chunk_index": 4,
                "Header 1": "Part II",
                "Header 2": "Item 7"
            })
        );
    }

    #[test]
    fn test_metadata_reads_without_headers() {
        let meta: ChunkMetadata =
            serde_json::from_value(json!({"ticker": "MSFT", "source": "x.md", "chunk_index": 0})).unwrap();
        assert_eq!(meta.header_1, None);
        assert_eq!(meta.ticker, "MSFT");
    }
}
