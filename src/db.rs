use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{PgPool, Row};
use std::sync::Arc;

use crate::cache_manager::{CacheEntry, CacheStore};
use crate::generation_errors::GenerationError;
use crate::shopping_list::ShoppingList;

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing shopping list cache schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS shopping_list_cache (
            fingerprint TEXT PRIMARY KEY,
            payload JSONB NOT NULL,
            generation_token BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create shopping_list_cache table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS shopping_list_cache_created_at_idx
         ON shopping_list_cache (created_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create created_at index")?;

    info!("Shopping list cache schema initialized successfully");
    Ok(())
}

/// Insert or replace the cache row for a fingerprint
pub async fn upsert_cache_entry(pool: &PgPool, entry: &CacheEntry) -> Result<()> {
    let payload = serde_json::to_value(entry.payload.as_ref()).context("Failed to serialize payload")?;
    let token = i64::try_from(entry.generation_token).context("Generation token out of range")?;

    sqlx::query(
        "INSERT INTO shopping_list_cache (fingerprint, payload, generation_token, created_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (fingerprint) DO UPDATE
         SET payload = EXCLUDED.payload,
             generation_token = EXCLUDED.generation_token,
             created_at = EXCLUDED.created_at",
    )
    .bind(&entry.fingerprint)
    .bind(payload)
    .bind(token)
    .bind(entry.created_at)
    .execute(pool)
    .await
    .context("Failed to upsert cache entry")?;

    info!("Stored cache entry {}", entry.fingerprint);
    Ok(())
}

/// Read the cache row for a fingerprint
pub async fn read_cache_entry(pool: &PgPool, fingerprint: &str) -> Result<Option<CacheEntry>> {
    let row = sqlx::query(
        "SELECT fingerprint, payload, generation_token, created_at
         FROM shopping_list_cache WHERE fingerprint = $1",
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await
    .context("Failed to read cache entry")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let payload: serde_json::Value = row.get("payload");
    let payload: ShoppingList =
        serde_json::from_value(payload).context("Failed to deserialize cached shopping list")?;
    let token: i64 = row.get("generation_token");
    let created_at: DateTime<Utc> = row.get("created_at");

    Ok(Some(CacheEntry {
        fingerprint: row.get("fingerprint"),
        payload: Arc::new(payload),
        created_at,
        generation_token: u64::try_from(token).unwrap_or_default(),
    }))
}

/// Delete the cache row for a fingerprint
pub async fn delete_cache_entry(pool: &PgPool, fingerprint: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM shopping_list_cache WHERE fingerprint = $1")
        .bind(fingerprint)
        .execute(pool)
        .await
        .context("Failed to delete cache entry")?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        info!("Deleted cache entry {}", fingerprint);
    }
    Ok(deleted)
}

/// Delete every row older than `cutoff`, returning how many went
pub async fn purge_cache_entries_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM shopping_list_cache WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await
        .context("Failed to purge cache entries")?;

    info!("Purged {} cache entries older than {}", result.rows_affected(), cutoff);
    Ok(result.rows_affected())
}

/// [`CacheStore`] backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the cache table exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to cache database")?;
        init_database_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(err: anyhow::Error) -> GenerationError {
    GenerationError::CacheUnavailable(format!("{err:#}"))
}

#[async_trait]
impl CacheStore for PgCacheStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, GenerationError> {
        read_cache_entry(&self.pool, fingerprint).await.map_err(unavailable)
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), GenerationError> {
        upsert_cache_entry(&self.pool, entry).await.map_err(unavailable)
    }

    async fn remove(&self, fingerprint: &str) -> Result<bool, GenerationError> {
        delete_cache_entry(&self.pool, fingerprint).await.map_err(unavailable)
    }
}
