use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::Namespace;

#[derive(Clone)]
pub struct NamespaceRepo {
    pool: PgPool,
}

impl NamespaceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> StoreResult<Namespace> {
        validate_name(name)?;
        let row = sqlx::query("INSERT INTO namespaces (name) VALUES ($1) RETURNING id, name, created_at")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row_to_namespace(&row))
    }

    pub async fn get_by_name(&self, name: &str) -> StoreResult<Namespace> {
        let row = sqlx::query("SELECT id, name, created_at FROM namespaces WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NamespaceNotFound)?;
        Ok(row_to_namespace(&row))
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<Namespace> {
        let row = sqlx::query("SELECT id, name, created_at FROM namespaces WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NamespaceNotFound)?;
        Ok(row_to_namespace(&row))
    }

    pub async fn list(&self) -> StoreResult<Vec<Namespace>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM namespaces ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_namespace).collect())
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM namespaces WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NamespaceNotFound);
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.len() > 63 {
        return Err(StoreError::InvalidNamespaceName(name.to_string()));
    }
    let ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !ok {
        return Err(StoreError::InvalidNamespaceName(name.to_string()));
    }
    Ok(())
}

fn row_to_namespace(row: &sqlx::postgres::PgRow) -> Namespace {
    use sqlx::Row;
    Namespace {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_overlong_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
        assert!(validate_name("a".repeat(63).as_str()).is_ok());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(validate_name("has space").is_err());
        assert!(validate_name("has/slash").is_err());
        assert!(validate_name("valid-name_1.2").is_ok());
    }
}
