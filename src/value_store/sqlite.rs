//! SQLite-backed ValueStore
//!
//! Persistent state mirror for the daemon. Schema is created on first
//! connect; values are stored as JSON scalars so the tagged value type
//! round-trips without a custom codec.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{ObjectKind, ObjectMeta, StateValue, StoredState, ValueStore};
use crate::{Error, Result};

/// SQLite store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and ensure the schema exists
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                path TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                meta TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS states (
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                ack INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn kind_str(kind: ObjectKind) -> &'static str {
        match kind {
            ObjectKind::Channel => "channel",
            ObjectKind::State => "state",
        }
    }
}

#[async_trait]
impl ValueStore for SqliteStore {
    async fn get_state(&self, name: &str) -> Result<Option<StoredState>> {
        let row = sqlx::query("SELECT value, ack FROM states WHERE path = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                let value: StateValue = serde_json::from_str(&raw)
                    .map_err(|e| Error::Backend(format!("Corrupt state {}: {}", name, e)))?;
                let ack: i64 = row.get("ack");
                Ok(Some(StoredState {
                    value,
                    ack: ack != 0,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set_state(&self, name: &str, value: StateValue, ack: bool) -> Result<()> {
        let raw = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO states (path, value, ack, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                value = excluded.value,
                ack = excluded.ack,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(raw)
        .bind(ack as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM objects WHERE path = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create_object(&self, name: &str, kind: ObjectKind, meta: ObjectMeta) -> Result<()> {
        let meta_json = serde_json::to_string(&meta)?;
        sqlx::query(
            "INSERT INTO objects (path, kind, meta) VALUES (?, ?, ?) ON CONFLICT(path) DO NOTHING",
        )
        .bind(name)
        .bind(Self::kind_str(kind))
        .bind(meta_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let subtree = format!("{}.%", name);
        sqlx::query("DELETE FROM objects WHERE path = ? OR path LIKE ?")
            .bind(name)
            .bind(&subtree)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM states WHERE path = ? OR path LIKE ?")
            .bind(name)
            .bind(&subtree)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_channels(&self, prefix: &str) -> Result<Vec<String>> {
        let subtree = format!("{}.%", prefix);
        let rows =
            sqlx::query("SELECT path FROM objects WHERE kind = 'channel' AND path LIKE ? ORDER BY path")
                .bind(&subtree)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|row| row.get("path")).collect())
    }
}
