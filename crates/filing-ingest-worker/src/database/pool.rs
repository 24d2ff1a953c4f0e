use crate::config::DatabaseConfig;
use crate::utils::error::WorkerError;
use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(WorkerError::from)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(WorkerError::from)?;
        info!("🗄️  Connected to vector store (pool size {})", config.pool_max_size);

        Ok(Self { pool })
    }

    /// Pool that connects on first use; for runs that may never touch the index.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .connect_lazy(&config.url)
            .map_err(WorkerError::from)?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_url_is_database_error() {
        let config = DatabaseConfig {
            url: "not a database url".to_string(),
            pool_max_size: 1,
            pool_timeout_seconds: 1,
            collection: "filings".to_string(),
        };

        let err = DbPool::connect_lazy(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<WorkerError>(),
            Some(WorkerError::DatabaseError(_))
        ));
    }
}
