//! Durable SQLite backend.
//!
//! All stores share one `records` table, partitioned by store name:
//!
//! ```text
//! records(seq, store, key, cid, body)
//! ```
//!
//! `seq` preserves insertion order; `body` is the record as JSON text.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::Backend;
use crate::error::{StorageError, StorageResult};
use crate::record::Record;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    store TEXT NOT NULL,
    key TEXT NOT NULL,
    cid TEXT,
    body TEXT NOT NULL,
    UNIQUE (store, key)
);
CREATE INDEX IF NOT EXISTS idx_records_store_cid ON records (store, cid);
"#;

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    store: String,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database at `path` and its schema.
    pub async fn open(path: &Path, store: &str) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::backend(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, store).await
    }

    /// Uses an existing pool, creating the schema if missing.
    pub async fn with_pool(pool: SqlitePool, store: &str) -> StorageResult<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        tracing::debug!("Opened sqlite store '{}'", store);

        Ok(Self {
            pool,
            store: store.to_string(),
        })
    }

    /// Name of the logical store.
    pub fn store(&self) -> &str {
        &self.store
    }

    fn decode(body: &str) -> StorageResult<Record> {
        serde_json::from_str(body)
            .map_err(|e| StorageError::backend(format!("corrupted record: {}", e)))
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn get(&self, identifier: &str) -> StorageResult<Record> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT body FROM records WHERE store = ? AND (key = ? OR cid = ?) ORDER BY seq LIMIT 1",
        )
        .bind(&self.store)
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((body,)) => Self::decode(&body),
            None => Err(StorageError::not_found(identifier)),
        }
    }

    async fn set(&self, record: &Record) -> StorageResult<Record> {
        let key = record.require_key()?;
        let cid = record.cid();
        let body = serde_json::to_string(record)
            .map_err(|e| StorageError::validation(format!("cannot serialize record: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        // A record that gained a server id takes over its cid row in place.
        if let Some(cid) = cid.as_deref().filter(|cid| *cid != key) {
            sqlx::query(
                r#"
                UPDATE records SET key = ?
                WHERE store = ? AND key = ?
                  AND NOT EXISTS (SELECT 1 FROM records WHERE store = ? AND key = ?)
                "#,
            )
            .bind(&key)
            .bind(&self.store)
            .bind(cid)
            .bind(&self.store)
            .bind(&key)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM records WHERE store = ? AND key = ?")
                .bind(&self.store)
                .bind(cid)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO records (store, key, cid, body) VALUES (?, ?, ?, ?)
            ON CONFLICT (store, key) DO UPDATE SET cid = excluded.cid, body = excluded.body
            "#,
        )
        .bind(&self.store)
        .bind(&key)
        .bind(&cid)
        .bind(&body)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(record.clone())
    }

    async fn remove(&self, identifier: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE store = ? AND (key = ? OR cid = ?)")
            .bind(&self.store)
            .bind(identifier)
            .bind(identifier)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(identifier));
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        sqlx::query("DELETE FROM records WHERE store = ?")
            .bind(&self.store)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_all(&self) -> StorageResult<Vec<Record>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT body FROM records WHERE store = ? ORDER BY seq")
                .bind(&self.store)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(|(body,)| Self::decode(body)).collect()
    }

    async fn size(&self) -> StorageResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records WHERE store = ?")
            .bind(&self.store)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        backend: SqliteBackend,
        temp_dir: TempDir,
    }

    async fn setup_backend(store: &str) -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let backend = SqliteBackend::open(&temp_dir.path().join("morel.db"), store)
            .await
            .unwrap();
        TestContext { backend, temp_dir }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let ctx = setup_backend("samples").await;
        let record = Record::try_from(json!({"cid": "abc", "count": 3})).unwrap();

        ctx.backend.set(&record).await.unwrap();

        let fetched = ctx.backend.get("abc").await.unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let ctx = setup_backend("samples").await;
        let err = ctx.backend.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_order_survives_update() {
        let ctx = setup_backend("samples").await;
        for cid in ["a", "b", "c"] {
            ctx.backend.set(&Record::with_cid(cid)).await.unwrap();
        }
        let updated = Record::try_from(json!({"cid": "a", "n": 1})).unwrap();
        ctx.backend.set(&updated).await.unwrap();

        let all = ctx.backend.get_all().await.unwrap();
        let keys: Vec<String> = all.iter().filter_map(Record::key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(all[0].get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_server_id_rekeys_row() {
        let ctx = setup_backend("samples").await;
        ctx.backend.set(&Record::with_cid("abc")).await.unwrap();
        ctx.backend.set(&Record::with_cid("def")).await.unwrap();

        let synced = Record::try_from(json!({"cid": "abc", "id": 12})).unwrap();
        ctx.backend.set(&synced).await.unwrap();

        assert_eq!(ctx.backend.size().await.unwrap(), 2);
        assert_eq!(ctx.backend.get("12").await.unwrap(), synced);
        assert_eq!(ctx.backend.get("abc").await.unwrap(), synced);

        let keys: Vec<String> = ctx
            .backend
            .get_all()
            .await
            .unwrap()
            .iter()
            .filter_map(Record::key)
            .collect();
        assert_eq!(keys, vec!["12", "def"]);
    }

    #[tokio::test]
    async fn test_stores_are_partitioned() {
        let ctx = setup_backend("samples").await;
        let occurrences = SqliteBackend::with_pool(ctx.backend.pool.clone(), "occurrences")
            .await
            .unwrap();

        ctx.backend.set(&Record::with_cid("abc")).await.unwrap();

        assert_eq!(occurrences.size().await.unwrap(), 0);
        assert!(occurrences.get("abc").await.is_err());
        assert_eq!(occurrences.store(), "occurrences");
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let ctx = setup_backend("samples").await;
        ctx.backend.set(&Record::with_cid("a")).await.unwrap();
        ctx.backend.set(&Record::with_cid("b")).await.unwrap();

        ctx.backend.remove("a").await.unwrap();
        assert!(ctx.backend.remove("a").await.unwrap_err().is_not_found());

        ctx.backend.clear().await.unwrap();
        ctx.backend.clear().await.unwrap();
        assert_eq!(ctx.backend.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let ctx = setup_backend("samples").await;
        ctx.backend.set(&Record::with_cid("persist")).await.unwrap();

        let path = ctx.temp_dir.path().join("morel.db");
        let reopened = SqliteBackend::open(&path, "samples").await.unwrap();
        assert_eq!(
            reopened.get("persist").await.unwrap(),
            Record::with_cid("persist")
        );
    }
}
