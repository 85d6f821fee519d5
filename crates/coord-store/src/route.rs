use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::Route;

#[derive(Clone)]
pub struct RouteRepo {
    pool: PgPool,
}

impl RouteRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn advertise(&self, node_id: i64, prefix: &str) -> StoreResult<Route> {
        let row = sqlx::query(
            "INSERT INTO routes (node_id, prefix) VALUES ($1, $2)
             ON CONFLICT (node_id, prefix) DO UPDATE SET prefix = EXCLUDED.prefix
             RETURNING id, node_id, prefix, enabled, created_at",
        )
        .bind(node_id)
        .bind(prefix)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_route(&row))
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<Route> {
        let row = sqlx::query("SELECT id, node_id, prefix, enabled, created_at FROM routes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::RouteNotFound)?;
        Ok(row_to_route(&row))
    }

    pub async fn list_by_node(&self, node_id: i64) -> StoreResult<Vec<Route>> {
        let rows = sqlx::query(
            "SELECT id, node_id, prefix, enabled, created_at FROM routes WHERE node_id = $1 ORDER BY prefix",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_route).collect())
    }

    pub async fn list_enabled_by_node(&self, node_id: i64) -> StoreResult<Vec<Route>> {
        let rows = sqlx::query(
            "SELECT id, node_id, prefix, enabled, created_at FROM routes
             WHERE node_id = $1 AND enabled = true ORDER BY prefix",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_route).collect())
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE routes SET enabled = $2 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RouteNotFound);
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RouteNotFound);
        }
        Ok(())
    }
}

fn row_to_route(row: &sqlx::postgres::PgRow) -> Route {
    Route {
        id: row.get("id"),
        node_id: row.get("node_id"),
        prefix: row.get("prefix"),
        enabled: row.get("enabled"),
        created_at: row.get("created_at"),
    }
}
