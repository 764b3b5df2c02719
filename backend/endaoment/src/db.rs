//! Deployment record store: migrations, deployment records and task runs.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;

/// Open (creating if needed) the SQLite store and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    // An in-memory database lives as long as its single connection.
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Deployment records
// ─────────────────────────────────────────────────────────

/// Row as stored. JSON columns are kept as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeploymentRecord {
    pub network: String,
    pub name: String,
    pub address: String,
    pub abi: String,
    pub args: String,
    pub receipt: String,
    pub deployed_at: String,
}

/// API rendering of a [`DeploymentRecord`] with its JSON columns parsed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub network: String,
    pub name: String,
    pub address: String,
    pub abi: Value,
    pub args: Value,
    pub receipt: Value,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn view(&self) -> Result<DeploymentView> {
        Ok(DeploymentView {
            network: self.network.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            abi: serde_json::from_str(&self.abi)?,
            args: serde_json::from_str(&self.args)?,
            receipt: serde_json::from_str(&self.receipt)?,
            deployed_at: DateTime::parse_from_rfc3339(&self.deployed_at)?.with_timezone(&Utc),
        })
    }
}

pub struct NewDeployment<'a> {
    pub network: &'a str,
    pub name: &'a str,
    pub address: &'a str,
    pub abi: &'a Value,
    pub args: &'a Value,
    pub receipt: &'a Value,
}

/// Insert or overwrite the record for `(network, name)`.
pub async fn upsert_deployment(pool: &SqlitePool, record: &NewDeployment<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO deployments (network, name, address, abi, args, receipt)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (network, name) DO UPDATE SET
            address     = excluded.address,
            abi         = excluded.abi,
            args        = excluded.args,
            receipt     = excluded.receipt,
            deployed_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        "#,
    )
    .bind(record.network)
    .bind(record.name)
    .bind(record.address)
    .bind(record.abi.to_string())
    .bind(record.args.to_string())
    .bind(record.receipt.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_deployment(
    pool: &SqlitePool,
    network: &str,
    name: &str,
) -> Result<Option<DeploymentRecord>> {
    let row = sqlx::query_as::<_, DeploymentRecord>(
        r#"
        SELECT network, name, address, abi, args, receipt, deployed_at
        FROM   deployments
        WHERE  network = ?1 AND name = ?2
        "#,
    )
    .bind(network)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All records of a network, ordered by name.
pub async fn list_deployments(pool: &SqlitePool, network: &str) -> Result<Vec<DeploymentRecord>> {
    let rows = sqlx::query_as::<_, DeploymentRecord>(
        r#"
        SELECT network, name, address, abi, args, receipt, deployed_at
        FROM   deployments
        WHERE  network = ?1
        ORDER  BY name ASC
        "#,
    )
    .bind(network)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Task runs
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRun {
    pub network: String,
    pub task: String,
    pub fingerprint: String,
    pub completed_at: String,
}

pub async fn save_task_run(pool: &SqlitePool, network: &str, task: &str, fingerprint: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO task_runs (network, task, fingerprint)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (network, task) DO UPDATE SET
            fingerprint  = excluded.fingerprint,
            completed_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        "#,
    )
    .bind(network)
    .bind(task)
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_task_run(pool: &SqlitePool, network: &str, task: &str) -> Result<Option<TaskRun>> {
    let row = sqlx::query_as::<_, TaskRun>(
        "SELECT network, task, fingerprint, completed_at FROM task_runs WHERE network = ?1 AND task = ?2",
    )
    .bind(network)
    .bind(task)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Forget every record of a network. Returns the number of rows removed.
pub async fn clear_network(pool: &SqlitePool, network: &str) -> Result<u64> {
    let deployments = sqlx::query("DELETE FROM deployments WHERE network = ?1")
        .bind(network)
        .execute(pool)
        .await?
        .rows_affected();
    let runs = sqlx::query("DELETE FROM task_runs WHERE network = ?1")
        .bind(network)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(deployments + runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record<'a>(network: &'a str, name: &'a str, address: &'a str, abi: &'a Value) -> NewDeployment<'a> {
        NewDeployment {
            network,
            name,
            address,
            abi,
            args: abi,
            receipt: abi,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_network_and_name() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        let abi = json!(["function faucet()"]);

        upsert_deployment(&pool, &record("sim", "MockUSDC", "0x01", &abi)).await.unwrap();
        upsert_deployment(&pool, &record("sim", "MockUSDC", "0x02", &abi)).await.unwrap();
        upsert_deployment(&pool, &record("sepolia", "MockUSDC", "0x03", &abi)).await.unwrap();

        let rows = list_deployments(&pool, "sim").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, "0x02");

        let view = get_deployment(&pool, "sepolia", "MockUSDC").await.unwrap().unwrap().view().unwrap();
        assert_eq!(view.abi, abi);
        assert!(view.deployed_at <= Utc::now());
        assert!(get_deployment(&pool, "sepolia", "LosslessVault").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_runs_track_latest_fingerprint() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        assert!(get_task_run(&pool, "sim", "MockUSDC").await.unwrap().is_none());

        save_task_run(&pool, "sim", "MockUSDC", "aa").await.unwrap();
        save_task_run(&pool, "sim", "MockUSDC", "bb").await.unwrap();
        let run = get_task_run(&pool, "sim", "MockUSDC").await.unwrap().unwrap();
        assert_eq!(run.fingerprint, "bb");
    }

    #[tokio::test]
    async fn clear_network_leaves_other_networks() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        let abi = json!([]);
        upsert_deployment(&pool, &record("sim", "MockUSDC", "0x01", &abi)).await.unwrap();
        upsert_deployment(&pool, &record("local", "MockUSDC", "0x01", &abi)).await.unwrap();
        save_task_run(&pool, "sim", "MockUSDC", "aa").await.unwrap();

        assert_eq!(clear_network(&pool, "sim").await.unwrap(), 2);
        assert_eq!(list_deployments(&pool, "local").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let pool = init_pool(path.to_str().unwrap()).await.unwrap();
        save_task_run(&pool, "sim", "MockUSDC", "aa").await.unwrap();
        assert!(path.exists());
    }
}
