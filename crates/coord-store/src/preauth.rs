use chrono::{DateTime, Utc};
use rand::RngCore;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::PreAuthKey;

#[derive(Clone)]
pub struct PreAuthKeyRepo {
    pool: PgPool,
}

impl PreAuthKeyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        namespace_id: Uuid,
        reusable: bool,
        ephemeral: bool,
        expiration: Option<DateTime<Utc>>,
    ) -> StoreResult<PreAuthKey> {
        let secret = generate_key_secret();
        let row = sqlx::query(
            "INSERT INTO pre_auth_keys (key_secret, namespace_id, reusable, ephemeral, expiration)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, key_secret, namespace_id, reusable, ephemeral, used, expiration, created_at",
        )
        .bind(&secret)
        .bind(namespace_id)
        .bind(reusable)
        .bind(ephemeral)
        .bind(expiration)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_key(&row))
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<PreAuthKey> {
        let row = sqlx::query(
            "SELECT id, key_secret, namespace_id, reusable, ephemeral, used, expiration, created_at
             FROM pre_auth_keys WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::PreAuthKeyNotFound)?;
        Ok(row_to_key(&row))
    }

    pub async fn get_by_secret(&self, secret: &str) -> StoreResult<PreAuthKey> {
        let row = sqlx::query(
            "SELECT id, key_secret, namespace_id, reusable, ephemeral, used, expiration, created_at
             FROM pre_auth_keys WHERE key_secret = $1",
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::PreAuthKeyNotFound)?;
        Ok(row_to_key(&row))
    }

    pub async fn mark_used(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE pre_auth_keys SET used = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revoke a key outright by backdating its expiration to now, the only
    /// way to disable a reusable key (`mark_used` has no effect on one,
    /// since `is_usable` only consults `used` for non-reusable keys).
    pub async fn expire(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("UPDATE pre_auth_keys SET expiration = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PreAuthKeyNotFound);
        }
        Ok(())
    }

    pub async fn list_by_namespace(&self, namespace_id: Uuid) -> StoreResult<Vec<PreAuthKey>> {
        let rows = sqlx::query(
            "SELECT id, key_secret, namespace_id, reusable, ephemeral, used, expiration, created_at
             FROM pre_auth_keys WHERE namespace_id = $1 ORDER BY created_at DESC",
        )
        .bind(namespace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_key).collect())
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM pre_auth_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PreAuthKeyNotFound);
        }
        Ok(())
    }
}

fn generate_key_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn row_to_key(row: &sqlx::postgres::PgRow) -> PreAuthKey {
    PreAuthKey {
        id: row.get("id"),
        key_secret: row.get("key_secret"),
        namespace_id: row.get("namespace_id"),
        reusable: row.get("reusable"),
        ephemeral: row.get("ephemeral"),
        used: row.get("used"),
        expiration: row.get("expiration"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_48_hex_chars() {
        let secret = generate_key_secret();
        assert_eq!(secret.len(), 48);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
