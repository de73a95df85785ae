use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::database::{can_replace, CooldownStore, StoreError, StoreResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed cooldown store sharing one long-lived connection pool.
///
/// Calls run on tokio's blocking pool so a slow disk never stalls the
/// runtime that drives the chat surfaces.
#[derive(Clone)]
pub struct SqliteCooldownStore {
    pool: Pool<SqliteConnectionManager>,
}

impl fmt::Debug for SqliteCooldownStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.pool.state();
        f.debug_struct("SqliteCooldownStore")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl SqliteCooldownStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(prepare_connection);
        let pool = Pool::new(manager)?;

        let conn = pool.get()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cooldowns (
            requester_id TEXT PRIMARY KEY,
            last_disbursed_at INTEGER NOT NULL
        )",
            [],
        )?;

        tracing::info!("Opened cooldown store at {}", path.display());
        Ok(SqliteCooldownStore { pool })
    }

    async fn with_connection<T, F>(&self, job: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            job(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn prepare_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "FULL")
}

fn select_last_disbursed(conn: &Connection, requester: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT last_disbursed_at FROM cooldowns WHERE requester_id = ?1", params![requester], |row| row.get(0))
        .optional()
}

#[async_trait]
impl CooldownStore for SqliteCooldownStore {
    async fn get(&self, requester: &str) -> StoreResult<Option<i64>> {
        let requester = requester.to_string();
        self.with_connection(move |conn| Ok(select_last_disbursed(conn, &requester)?)).await
    }

    async fn put(&self, requester: &str, timestamp: i64) -> StoreResult<()> {
        let requester = requester.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO cooldowns (requester_id, last_disbursed_at) VALUES (?1, ?2)
                ON CONFLICT(requester_id) DO UPDATE SET last_disbursed_at = MAX(last_disbursed_at, excluded.last_disbursed_at)",
                params![requester, timestamp],
            )?;
            Ok(())
        })
        .await
    }

    async fn compare_and_put(&self, requester: &str, expected: Option<i64>, timestamp: i64) -> StoreResult<bool> {
        let requester = requester.to_string();
        self.with_connection(move |conn| {
            // IMMEDIATE takes the write lock up front, so the read below cannot go stale
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = select_last_disbursed(&tx, &requester)?;
            if !can_replace(current, expected, timestamp) {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO cooldowns (requester_id, last_disbursed_at) VALUES (?1, ?2)
                ON CONFLICT(requester_id) DO UPDATE SET last_disbursed_at = excluded.last_disbursed_at",
                params![requester, timestamp],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }
}
