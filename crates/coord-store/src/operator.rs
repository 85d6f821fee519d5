use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::Operator;

#[derive(Clone)]
pub struct OperatorRepo {
    pool: PgPool,
}

impl OperatorRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, username: &str, password_hash: &str) -> StoreResult<Operator> {
        let row = sqlx::query(
            "INSERT INTO operators (username, password_hash) VALUES ($1, $2)
             RETURNING id, username, password_hash, role, created_at, last_login",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_operator(&row))
    }

    pub async fn get_by_username(&self, username: &str) -> StoreResult<Operator> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at, last_login
             FROM operators WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::OperatorNotFound)?;
        Ok(row_to_operator(&row))
    }

    pub async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE operators SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_operator(row: &sqlx::postgres::PgRow) -> Operator {
    Operator {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    }
}
