use super::{ChunkMetadata, DbPool, IngestionRecord, SearchHit, VectorStore};
use crate::utils::error::WorkerError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashSet;
use tracing::{debug, info};

const UNDEFINED_TABLE: &str = "42P01";

#[derive(FromRow)]
struct HitRow {
    content: String,
    cmetadata: Json<ChunkMetadata>,
    score: f64,
    created_at: Option<DateTime<Utc>>,
}

/// PostgreSQL + pgvector implementation of [`VectorStore`].
///
/// All rows live in `filing_chunks`, partitioned by the `collection` column.
pub struct PgVectorStore {
    pool: DbPool,
    collection: String,
}

impl PgVectorStore {
    pub fn new(pool: DbPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Create the `vector` extension and the chunk table if missing.
    pub async fn ensure_schema(&self, dimension: usize) -> Result<()> {
        let pool = self.pool.get_pool();

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
            .map_err(WorkerError::from)?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS filing_chunks (
                   id BIGSERIAL PRIMARY KEY,
                   collection TEXT NOT NULL,
                   content TEXT NOT NULL,
                   embedding vector({}) NOT NULL,
                   cmetadata JSONB NOT NULL,
                   created_at TIMESTAMPTZ NOT NULL DEFAULT now()
               )"#,
            dimension
        ))
        .execute(pool)
        .await
        .map_err(WorkerError::from)?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS filing_chunks_ticker_idx
               ON filing_chunks (collection, (cmetadata->>'ticker'))"#,
        )
        .execute(pool)
        .await
        .map_err(WorkerError::from)?;

        info!("✅ Schema ready (filing_chunks, {} dimensions)", dimension);
        Ok(())
    }
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == UNDEFINED_TABLE)
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn distinct_metadata_values(&self, field: &str) -> Result<HashSet<String>> {
        let result = sqlx::query_scalar::<_, Option<String>>(
            r#"SELECT DISTINCT cmetadata->>$2
               FROM filing_chunks
               WHERE collection = $1"#,
        )
        .bind(&self.collection)
        .bind(field)
        .fetch_all(self.pool.get_pool())
        .await;

        match result {
            Ok(values) => Ok(values.into_iter().flatten().collect()),
            Err(e) if is_undefined_table(&e) => {
                debug!("filing_chunks does not exist yet; nothing ingested");
                Ok(HashSet::new())
            }
            Err(e) => Err(WorkerError::from(e).into()),
        }
    }

    async fn upsert(&self, records: Vec<IngestionRecord>) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut transaction = self.pool.get_pool().begin().await.map_err(WorkerError::from)?;
        let mut written = 0;

        for record in records {
            let result = sqlx::query(
                r#"INSERT INTO filing_chunks (collection, content, embedding, cmetadata)
                   VALUES ($1, $2, $3, $4)"#,
            )
            .bind(&self.collection)
            .bind(&record.content)
            .bind(Vector::from(record.embedding))
            .bind(Json(&record.metadata))
            .execute(&mut *transaction)
            .await
            .map_err(WorkerError::from)?;

            written += result.rows_affected();
        }

        transaction.commit().await.map_err(WorkerError::from)?;
        debug!("Inserted {} chunks", written);

        Ok(written)
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        ticker: Option<String>,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query_as::<_, HitRow>(
            r#"SELECT content, cmetadata, (embedding <-> $1)::float8 AS score, created_at
               FROM filing_chunks
               WHERE collection = $2
                 AND ($3::text IS NULL OR cmetadata->>'ticker' = $3)
               ORDER BY embedding <-> $1
               LIMIT $4"#,
        )
        .bind(Vector::from(query.to_vec()))
        .bind(&self.collection)
        .bind(ticker)
        .bind(k as i64)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(WorkerError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                content: row.content,
                metadata: row.cmetadata.0,
                score: row.score,
                created_at: row.created_at,
            })
            .collect())
    }
}
