//! SQLite-backed key-value store

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::{KvStore, StoreError};

pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    /// Open or create the database at the given path
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        tracing::debug!(path = %db_path.display(), "opened kv database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Physically remove expired rows. Reads already ignore them.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM kv WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
            [now_ms()],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "purged expired kv entries");
        }
        Ok(removed)
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().await;
        let value = conn
            .query_row(
                r#"SELECT value FROM kv
                   WHERE key = ?1 AND (expires_at_ms IS NULL OR expires_at_ms > ?2)"#,
                params![key, now_ms()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, expires_at_ms) VALUES (?1, ?2, NULL)",
            params![key, value],
        )?;
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at_ms = now_ms().saturating_add(ttl.as_millis() as i64);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, expires_at_ms) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at_ms],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        // Only an expired row may be overwritten; a live one leaves 0 changes.
        let changed = conn.execute(
            r#"INSERT INTO kv (key, value, expires_at_ms) VALUES (?1, ?2, NULL)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at_ms = NULL
               WHERE kv.expires_at_ms IS NOT NULL AND kv.expires_at_ms <= ?3"#,
            params![key, value, now_ms()],
        )?;
        Ok(changed > 0)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS __kv_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );"#,
    )?;

    let applied: std::collections::HashSet<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM __kv_schema_version")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.filter_map(|r| r.ok()).collect()
    };

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            expires_at_ms INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at_ms);
        "#,
    )];

    for (version, sql) in migrations {
        if applied.contains(&version) {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO __kv_schema_version(version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}
