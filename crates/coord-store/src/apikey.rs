use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::ApiKey;

#[derive(Clone)]
pub struct ApiKeyRepo {
    pool: PgPool,
}

impl ApiKeyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a freshly minted key. `key_hash` is produced by the caller
    /// (the admin auth layer owns the hashing scheme); this repo only stores
    /// and retrieves it.
    pub async fn create(
        &self,
        prefix: &str,
        key_hash: &str,
        expiration: Option<DateTime<Utc>>,
    ) -> StoreResult<ApiKey> {
        let row = sqlx::query(
            "INSERT INTO api_keys (prefix, key_hash, expiration) VALUES ($1, $2, $3)
             RETURNING id, prefix, key_hash, expiration, last_seen, created_at",
        )
        .bind(prefix)
        .bind(key_hash)
        .bind(expiration)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_key(&row))
    }

    pub async fn get_by_prefix(&self, prefix: &str) -> StoreResult<ApiKey> {
        let row = sqlx::query(
            "SELECT id, prefix, key_hash, expiration, last_seen, created_at
             FROM api_keys WHERE prefix = $1",
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ApiKeyNotFound)?;
        Ok(row_to_key(&row))
    }

    pub async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE api_keys SET last_seen = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list(&self) -> StoreResult<Vec<ApiKey>> {
        let rows = sqlx::query(
            "SELECT id, prefix, key_hash, expiration, last_seen, created_at
             FROM api_keys ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_key).collect())
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ApiKeyNotFound);
        }
        Ok(())
    }
}

fn row_to_key(row: &sqlx::postgres::PgRow) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        prefix: row.get("prefix"),
        key_hash: row.get("key_hash"),
        expiration: row.get("expiration"),
        last_seen: row.get("last_seen"),
        created_at: row.get("created_at"),
    }
}
