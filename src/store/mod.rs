use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::store::models::{ChunkRecord, NewChunkRecord};
use crate::store::queries::ChunkQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Document-oriented metadata store backed by SQLite: one row per chunk,
/// queryable by document id, chunk id set, and vector id set.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/store/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn insert_chunks(&self, records: &[NewChunkRecord]) -> Result<u64> {
        ChunkQueries::insert_many(&self.pool, records).await
    }

    #[inline]
    pub async fn get_chunks_for_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        ChunkQueries::list_by_document(&self.pool, document_id).await
    }

    #[inline]
    pub async fn get_chunks_by_chunk_ids(&self, chunk_ids: &[String]) -> Result<Vec<ChunkRecord>> {
        ChunkQueries::get_by_chunk_ids(&self.pool, chunk_ids).await
    }

    #[inline]
    pub async fn get_chunks_by_vector_ids(
        &self,
        document_id: &str,
        vector_ids: &[i64],
    ) -> Result<Vec<ChunkRecord>> {
        ChunkQueries::get_by_vector_ids(&self.pool, document_id, vector_ids).await
    }

    #[inline]
    pub async fn vector_ids_for_document(&self, document_id: &str) -> Result<Vec<i64>> {
        ChunkQueries::vector_ids_for_document(&self.pool, document_id).await
    }

    #[inline]
    pub async fn delete_chunks_for_document(&self, document_id: &str) -> Result<u64> {
        ChunkQueries::delete_by_document(&self.pool, document_id).await
    }

    #[inline]
    pub async fn all_chunks(&self) -> Result<Vec<ChunkRecord>> {
        ChunkQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn max_vector_id(&self) -> Result<Option<i64>> {
        ChunkQueries::max_vector_id(&self.pool).await
    }

    #[inline]
    pub async fn count_chunks_for_document(&self, document_id: &str) -> Result<i64> {
        ChunkQueries::count_by_document(&self.pool, document_id).await
    }

    #[inline]
    pub async fn count_chunks(&self) -> Result<i64> {
        ChunkQueries::count_all(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
