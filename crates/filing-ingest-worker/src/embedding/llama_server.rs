use super::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::config::EmbeddingConfig;
use crate::utils::error::WorkerError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct LlamaEmbeddingRequest<'a> {
    content: &'a str,
    /// Routes the request on servers hosting several models.
    #[serde(skip_serializing_if = "str::is_empty")]
    model: &'a str,
}

/// HTTP client for a running llama-server started with `--embedding`.
pub struct LlamaServerEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl LlamaServerEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.trim().to_string(),
            dimension: config.dimension,
        })
    }

    /// Embed single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/embedding", self.base_url))
            .json(&LlamaEmbeddingRequest {
                content: text,
                model: &self.model,
            })
            .send()
            .await
            .map_err(WorkerError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::EmbeddingError(format!(
                "request failed: {} - {}",
                status, body
            ))
            .into());
        }

        let json: serde_json::Value = response.json().await.map_err(WorkerError::from)?;
        let embedding = parse_embedding(&json)?;

        if embedding.len() != self.dimension {
            return Err(WorkerError::EmbeddingError(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                embedding.len()
            ))
            .into());
        }

        Ok(embedding)
    }
}

fn as_vector(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Accepts both llama-server response shapes:
/// legacy `{"embedding":[...]}` and current `[{"index":0,"embedding":[...]}]`,
/// where the inner embedding may itself be nested one level (`[[...]]`).
fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = if let Some(items) = json.as_array() {
        let first = items
            .first()
            .ok_or_else(|| anyhow!("Received empty array from llama-server"))?;

        let field = first["embedding"]
            .as_array()
            .ok_or_else(|| anyhow!("Missing 'embedding' field in array response"))?;

        match field.first().and_then(|v| v.as_array()) {
            Some(nested) => {
                debug!("Detected nested embedding format [[...]]");
                as_vector(nested)
            }
            None => as_vector(field),
        }
    } else {
        let field = json["embedding"]
            .as_array()
            .ok_or_else(|| anyhow!("Missing 'embedding' field in legacy response"))?;
        as_vector(field)
    };

    if embedding.is_empty() {
        anyhow::bail!("Parsed embedding vector is empty");
    }

    Ok(embedding)
}

#[async_trait]
impl EmbeddingProvider for LlamaServerEmbedder {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let mut embeddings = Vec::with_capacity(request.texts.len());

        for (i, text) in request.texts.iter().enumerate() {
            debug!("Embedding text {}/{}", i + 1, request.texts.len());
            embeddings.push(self.embed_text(text).await?);
        }

        Ok(EmbeddingResponse { embeddings })
    }

    async fn embed_single(&self, text: String) -> Result<Vec<f32>> {
        self.embed_text(&text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_legacy_format() {
        let v = parse_embedding(&json!({"embedding": [0.5, -1.0, 2.0]})).unwrap();
        assert_eq!(v, vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_parse_array_format() {
        let v = parse_embedding(&json!([{"index": 0, "embedding": [0.25, 0.75]}])).unwrap();
        assert_eq!(v, vec![0.25, 0.75]);
    }

    #[test]
    fn test_parse_nested_array_format() {
        let v = parse_embedding(&json!([{"index": 0, "embedding": [[1.0, 2.0, 3.0]]}])).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(parse_embedding(&json!([])).is_err());
        assert!(parse_embedding(&json!({"data": []})).is_err());
        assert!(parse_embedding(&json!({"embedding": []})).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let embedder = LlamaServerEmbedder::new(&EmbeddingConfig {
            base_url: "http://127.0.0.1:8081/".to_string(),
            model: "all-mpnet-base-v2".to_string(),
            dimension: 768,
            batch_size: 32,
            request_timeout_seconds: 5,
        })
        .unwrap();
        assert_eq!(embedder.base_url, "http://127.0.0.1:8081");
        assert_eq!(embedder.model, "all-mpnet-base-v2");
    }

    #[test]
    fn test_request_body_names_model() {
        let body = serde_json::to_value(LlamaEmbeddingRequest {
            content: "Net sales",
            model: "all-mpnet-base-v2",
        })
        .unwrap();
        assert_eq!(body, json!({"content": "Net sales", "model": "all-mpnet-base-v2"}));

        let body = serde_json::to_value(LlamaEmbeddingRequest {
            content: "Net sales",
            model: "",
        })
        .unwrap();
        assert_eq!(body, json!({"content": "Net sales"}));
    }
}
