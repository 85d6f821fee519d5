use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::alloc::allocate_pair;
use crate::error::{StoreError, StoreResult};
use crate::models::{Endpoint, HostInfo, Node, RegistrationMethod};

#[derive(Clone)]
pub struct NodeRepo {
    pool: PgPool,
}

/// Fields needed to create a node; IPs are allocated internally under the
/// same transaction that inserts the row, per spec §4.6's locking note.
pub struct NewNode<'a> {
    pub machine_key: &'a str,
    pub node_key: &'a str,
    pub namespace_id: Uuid,
    pub hostname: &'a str,
    pub given_name: &'a str,
    pub registration_method: RegistrationMethod,
    pub pre_auth_key_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NodeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a node, allocating the next free v4/v6 address pair under a
    /// transaction so concurrent registrations cannot race onto the same
    /// address.
    pub async fn create(
        &self,
        new: NewNode<'_>,
        v4_prefix: &IpNet,
        v6_prefix: &IpNet,
    ) -> StoreResult<Node> {
        let mut tx = self.pool.begin().await?;

        let v4_rows = sqlx::query("SELECT ipv4 FROM nodes FOR UPDATE")
            .fetch_all(&mut *tx)
            .await?;
        let taken_v4: HashSet<IpAddr> = v4_rows
            .iter()
            .filter_map(|r| r.get::<String, _>("ipv4").parse().ok())
            .collect();
        let v6_rows = sqlx::query("SELECT ipv6 FROM nodes")
            .fetch_all(&mut *tx)
            .await?;
        let taken_v6: HashSet<IpAddr> = v6_rows
            .iter()
            .filter_map(|r| r.get::<String, _>("ipv6").parse().ok())
            .collect();

        let (v4, v6) = allocate_pair(v4_prefix, v6_prefix, &taken_v4, &taken_v6)?;

        let row = sqlx::query(
            "INSERT INTO nodes
                (machine_key, node_key, namespace_id, ipv4, ipv6, hostname, given_name,
                 registration_method, pre_auth_key_id, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9)
             RETURNING id, machine_key, node_key, disco_key, namespace_id, ipv4, ipv6,
                       hostname, given_name, host_info, endpoints, enabled_routes,
                       registration_method, pre_auth_key_id, expires_at, last_seen,
                       last_successful_update, created_at",
        )
        .bind(new.machine_key)
        .bind(new.node_key)
        .bind(new.namespace_id)
        .bind(v4.to_string())
        .bind(v6.to_string())
        .bind(new.hostname)
        .bind(new.registration_method.as_str())
        .bind(new.pre_auth_key_id)
        .bind(new.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row_to_node(&row))
    }

    pub async fn get_by_machine_key(&self, machine_key: &str) -> StoreResult<Node> {
        let row = sqlx::query(SELECT_NODE_BY_MACHINE_KEY)
            .bind(machine_key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NodeNotFound)?;
        Ok(row_to_node(&row))
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Node> {
        let row = sqlx::query(&format!("{SELECT_NODE_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NodeNotFound)?;
        Ok(row_to_node(&row))
    }

    pub async fn list_by_namespace(&self, namespace_id: Uuid) -> StoreResult<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "{SELECT_NODE_COLUMNS} WHERE namespace_id = $1 ORDER BY id"
        ))
        .bind(namespace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_node).collect())
    }

    pub async fn list_all(&self) -> StoreResult<Vec<Node>> {
        let rows = sqlx::query(&format!("{SELECT_NODE_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_node).collect())
    }

    pub async fn touch_last_seen(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE nodes SET last_seen = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_update_delivered(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE nodes SET last_successful_update = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_host_info(
        &self,
        id: i64,
        host_info: &HostInfo,
        endpoints: &[Endpoint],
    ) -> StoreResult<()> {
        let host_info_json: Value = serde_json::to_value(host_info).unwrap_or(Value::Null);
        let endpoints_json: Value = serde_json::to_value(endpoints).unwrap_or(Value::Null);
        sqlx::query("UPDATE nodes SET host_info = $2, endpoints = $3 WHERE id = $1")
            .bind(id)
            .bind(host_info_json)
            .bind(endpoints_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_enabled_routes(&self, id: i64, routes: &[String]) -> StoreResult<()> {
        let json: Value = serde_json::to_value(routes).unwrap_or(Value::Null);
        sqlx::query("UPDATE nodes SET enabled_routes = $2 WHERE id = $1")
            .bind(id)
            .bind(json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn rotate_node_key(&self, id: i64, new_node_key: &str) -> StoreResult<()> {
        sqlx::query("UPDATE nodes SET node_key = $2 WHERE id = $1")
            .bind(id)
            .bind(new_node_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn expire_now(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE nodes SET expires_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NodeNotFound);
        }
        Ok(())
    }
}

const SELECT_NODE_COLUMNS: &str = "SELECT id, machine_key, node_key, disco_key, namespace_id, \
    ipv4, ipv6, hostname, given_name, host_info, endpoints, enabled_routes, \
    registration_method, pre_auth_key_id, expires_at, last_seen, last_successful_update, \
    created_at FROM nodes";

const SELECT_NODE_BY_MACHINE_KEY: &str = "SELECT id, machine_key, node_key, disco_key, \
    namespace_id, ipv4, ipv6, hostname, given_name, host_info, endpoints, enabled_routes, \
    registration_method, pre_auth_key_id, expires_at, last_seen, last_successful_update, \
    created_at FROM nodes WHERE machine_key = $1";

fn row_to_node(row: &sqlx::postgres::PgRow) -> Node {
    let host_info: Value = row.get("host_info");
    let endpoints: Value = row.get("endpoints");
    let enabled_routes: Value = row.get("enabled_routes");
    Node {
        id: row.get("id"),
        machine_key: row.get("machine_key"),
        node_key: row.get("node_key"),
        disco_key: row.get("disco_key"),
        namespace_id: row.get("namespace_id"),
        ipv4: row.get("ipv4"),
        ipv6: row.get("ipv6"),
        hostname: row.get("hostname"),
        given_name: row.get("given_name"),
        host_info: serde_json::from_value(host_info).unwrap_or_default(),
        endpoints: serde_json::from_value(endpoints).unwrap_or_default(),
        enabled_routes: serde_json::from_value(enabled_routes).unwrap_or_default(),
        registration_method: RegistrationMethod::from_str(row.get("registration_method")),
        pre_auth_key_id: row.get("pre_auth_key_id"),
        expires_at: row.get("expires_at"),
        last_seen: row.get("last_seen"),
        last_successful_update: row.get("last_successful_update"),
        created_at: row.get("created_at"),
    }
}
